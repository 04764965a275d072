//! Managed skill reconciliation.

use std::collections::BTreeSet;

use serde::Serialize;

use super::credentials::merge_credentials;
use crate::catalog::{ManagedSkillDefinition, SkillCatalog};
use crate::model::{NewSkill, RecordId, SkillRecord};
use crate::store::{PersistenceError, Transaction};

/// Writes needed to bring stored skills in line with the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillPlan {
    /// Catalog skills with no stored counterpart.
    pub creates: Vec<NewSkill>,

    /// Stored skills whose catalog-owned fields changed, already merged.
    pub updates: Vec<SkillRecord>,

    /// Managed skills that left the catalog.
    pub deletes: Vec<SkillRecord>,
}

impl SkillPlan {
    /// Check whether the plan writes nothing.
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Outcome of a skill pass, listed by skill name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkillSyncReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl SkillSyncReport {
    /// Number of writes the pass committed.
    pub fn mutation_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Check whether the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.mutation_count() == 0
    }
}

/// Compute the writes for one skill pass.
///
/// Stored skills are matched to catalog entries by name. A matched skill
/// takes the catalog's description, display name and input parameters, and
/// its credentials are merged so stored values survive. Ownership and the
/// managed flag of a matched skill are never changed. Only skills flagged
/// managed are deleted; user skills are invisible to deletion even when the
/// catalog has never heard of them.
pub fn plan_skills(
    catalog: &SkillCatalog,
    stored: &[SkillRecord],
    owner_id: RecordId,
) -> SkillPlan {
    let mut plan = SkillPlan::default();
    let mut matched = BTreeSet::new();

    for definition in catalog.values() {
        match stored.iter().find(|skill| skill.name == definition.name) {
            Some(existing) => {
                matched.insert(existing.id);
                let merged = merge_skill(existing, definition);
                if merged != *existing {
                    plan.updates.push(merged);
                }
            }
            None => plan.creates.push(new_managed_skill(definition, owner_id)),
        }
    }

    plan.deletes = stored
        .iter()
        .filter(|skill| skill.managed && !matched.contains(&skill.id))
        .cloned()
        .collect();

    plan
}

/// Stage a skill plan on an open transaction.
pub async fn apply_skill_plan(
    tx: &mut (dyn Transaction + '_),
    plan: SkillPlan,
) -> Result<SkillSyncReport, PersistenceError> {
    let mut report = SkillSyncReport::default();

    for skill in plan.creates {
        let record = tx.insert_skill(skill).await?;
        tracing::debug!("Created managed skill {}", record.name);
        report.created.push(record.name);
    }

    for skill in plan.updates {
        tx.update_skill(&skill).await?;
        tracing::debug!("Updated managed skill {}", skill.name);
        report.updated.push(skill.name);
    }

    for skill in plan.deletes {
        tx.delete_skill(skill.id).await?;
        tracing::debug!("Deleted managed skill {}", skill.name);
        report.deleted.push(skill.name);
    }

    Ok(report)
}

fn new_managed_skill(definition: &ManagedSkillDefinition, owner_id: RecordId) -> NewSkill {
    NewSkill {
        name: definition.name.clone(),
        description: definition.description.clone(),
        display_name: definition.display_name.clone(),
        managed: true,
        owner_id,
        input_parameters: definition.input_parameters.clone(),
        credentials: Some(definition.credentials.clone().unwrap_or_default()),
    }
}

fn merge_skill(existing: &SkillRecord, definition: &ManagedSkillDefinition) -> SkillRecord {
    SkillRecord {
        description: definition.description.clone(),
        display_name: definition.display_name.clone(),
        input_parameters: definition.input_parameters.clone(),
        credentials: Some(merge_credentials(
            existing.credentials.as_ref(),
            definition.credentials.as_ref(),
        )),
        ..existing.clone()
    }
}
