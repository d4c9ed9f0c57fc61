//! Sharded in-memory store.
//!
//! Backs tests and single-node deployments. The atomicity contracts of the
//! store traits map onto DashMap shard locks here: the natural-key index
//! entry lock makes `upsert_primary` a conditional insert-or-update, and a
//! single `get_mut` critical section covers the attribution row, the
//! counter increment, and the service-set union of one attach.
//!
//! Lock order is natural_index → incidents → user_index; no path acquires
//! them in any other order.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use async_trait::async_trait;
use llm_incident_core::events::{
    AlertEnvelope, Attribution, Incident, IncidentAlert, NaturalKey,
};
use llm_incident_core::types::{CorrelationStrategy, IncidentStatus};
use llm_incident_core::{Error, Result};

use crate::{AlertStore, IncidentStore, StoreOnce, StoredAlert};

/// One incident with its attribution rows
#[derive(Debug, Clone)]
struct IncidentRecord {
    incident: Incident,
    alerts: Vec<IncidentAlert>,
    has_primary: bool,
}

/// In-memory [`AlertStore`] + [`IncidentStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    alerts: DashMap<String, StoredAlert>,
    incidents: DashMap<Uuid, IncidentRecord>,
    natural_index: DashMap<NaturalKey, Uuid>,
    user_index: DashMap<Uuid, Vec<Uuid>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn build_row(incident_id: Uuid, attribution: Attribution) -> IncidentAlert {
        IncidentAlert {
            id: Uuid::new_v4(),
            incident_id,
            source_type: attribution.source_type,
            source_alert_id: attribution.source_alert_id,
            title: attribution.title,
            service: attribution.service,
            severity: attribution.severity,
            strategy: attribution.strategy,
            score: attribution.score,
            details: attribution.details,
            metadata: attribution.metadata,
            attributed_at: Utc::now(),
        }
    }

    fn union_service(services: &mut Vec<String>, service: &str) {
        if !service.is_empty() && !services.iter().any(|s| s == service) {
            services.push(service.to_string());
        }
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn store_once(&self, envelope: &AlertEnvelope) -> Result<StoreOnce> {
        match self.alerts.entry(envelope.content_hash.clone()) {
            Entry::Occupied(existing) => Ok(StoreOnce {
                stored: false,
                alert_id: existing.get().id,
            }),
            Entry::Vacant(slot) => {
                let row = StoredAlert {
                    id: Uuid::new_v4(),
                    envelope: envelope.clone(),
                    stored_at: Utc::now(),
                };
                let alert_id = row.id;
                slot.insert(row);
                Ok(StoreOnce {
                    stored: true,
                    alert_id,
                })
            }
        }
    }

    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<StoredAlert>> {
        Ok(self.alerts.get(content_hash).map(|r| r.clone()))
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn upsert_primary(&self, envelope: &AlertEnvelope) -> Result<Incident> {
        let key = envelope.natural_key();
        match self.natural_index.entry(key) {
            Entry::Vacant(slot) => {
                let incident = Incident::from_envelope(envelope);
                let id = incident.id;
                self.incidents.insert(
                    id,
                    IncidentRecord {
                        incident: incident.clone(),
                        alerts: Vec::new(),
                        has_primary: false,
                    },
                );
                self.user_index
                    .entry(envelope.user_id)
                    .or_default()
                    .push(id);
                slot.insert(id);
                Ok(incident)
            }
            Entry::Occupied(existing) => {
                let id = *existing.get();
                let mut record = self
                    .incidents
                    .get_mut(&id)
                    .ok_or_else(|| Error::storage(format!("incident {id} missing from index")))?;
                let now = Utc::now();
                record.incident.updated_at = now;
                record
                    .incident
                    .metadata
                    .extend(envelope.metadata.clone());
                // Once analysis has summarized the incident, its open time
                // is frozen; earlier statuses allow the founding alert's
                // re-delivery to refresh it.
                if record.incident.status != IncidentStatus::Analyzed {
                    record.incident.started_at = now;
                }
                Ok(record.incident.clone())
            }
        }
    }

    async fn attach_alert(
        &self,
        incident_id: Uuid,
        attribution: Attribution,
    ) -> Result<IncidentAlert> {
        if attribution.strategy == CorrelationStrategy::Primary {
            return Err(Error::storage(
                "primary attributions must go through attach_primary",
            ));
        }
        let mut record = self
            .incidents
            .get_mut(&incident_id)
            .ok_or_else(|| Error::storage(format!("incident {incident_id} not found")))?;
        let row = Self::build_row(incident_id, attribution);
        record.incident.correlated_alert_count += 1;
        Self::union_service(&mut record.incident.affected_services, &row.service);
        record.incident.updated_at = row.attributed_at;
        record.alerts.push(row.clone());
        Ok(row)
    }

    async fn attach_primary(
        &self,
        incident_id: Uuid,
        attribution: Attribution,
    ) -> Result<Option<IncidentAlert>> {
        let mut record = self
            .incidents
            .get_mut(&incident_id)
            .ok_or_else(|| Error::storage(format!("incident {incident_id} not found")))?;
        let now = Utc::now();
        record.incident.correlated_alert_count += 1;
        record.incident.updated_at = now;
        if record.incident.affected_services.is_empty() {
            Self::union_service(
                &mut record.incident.affected_services,
                &attribution.service,
            );
        }
        if record.has_primary {
            // Natural-key collision path: the counter reflects the attach,
            // the partial uniqueness on `primary` rows holds.
            return Ok(None);
        }
        record.has_primary = true;
        let mut attribution = attribution;
        attribution.strategy = CorrelationStrategy::Primary;
        attribution.score = 1.0;
        let row = Self::build_row(incident_id, attribution);
        record.alerts.push(row.clone());
        Ok(Some(row))
    }

    async fn get(&self, incident_id: Uuid) -> Result<Option<Incident>> {
        Ok(self
            .incidents
            .get(&incident_id)
            .map(|r| r.incident.clone()))
    }

    async fn open_incidents(&self, user_id: Uuid) -> Result<Vec<Incident>> {
        let mut open: Vec<Incident> = self
            .ids_for_user(user_id)
            .into_iter()
            .filter_map(|id| self.incidents.get(&id).map(|r| r.incident.clone()))
            .filter(|i| i.status.is_open())
            .collect();
        open.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(open)
    }

    async fn list_incidents(&self, user_id: Uuid) -> Result<Vec<Incident>> {
        let mut all: Vec<Incident> = self
            .ids_for_user(user_id)
            .into_iter()
            .filter_map(|id| self.incidents.get(&id).map(|r| r.incident.clone()))
            .collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    async fn alerts_for_incident(&self, incident_id: Uuid) -> Result<Vec<IncidentAlert>> {
        Ok(self
            .incidents
            .get(&incident_id)
            .map(|r| r.alerts.clone())
            .unwrap_or_default())
    }

    async fn set_status(&self, incident_id: Uuid, status: IncidentStatus) -> Result<Incident> {
        let mut record = self
            .incidents
            .get_mut(&incident_id)
            .ok_or_else(|| Error::storage(format!("incident {incident_id} not found")))?;
        let current = record.incident.status;
        if current.is_terminal() {
            return Err(Error::invalid_transition(format!(
                "incident {incident_id} is {current}, no further transitions"
            )));
        }
        record.incident.status = status;
        record.incident.updated_at = Utc::now();
        Ok(record.incident.clone())
    }

    async fn set_analysis_ref(&self, incident_id: Uuid, task_ref: &str) -> Result<()> {
        let mut record = self
            .incidents
            .get_mut(&incident_id)
            .ok_or_else(|| Error::storage(format!("incident {incident_id} not found")))?;
        record.incident.analysis_task_ref = Some(task_ref.to_string());
        Ok(())
    }
}

impl MemoryStore {
    fn ids_for_user(&self, user_id: Uuid) -> Vec<Uuid> {
        self.user_index
            .get(&user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_incident_core::types::{Severity, SourceType};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn envelope(source: SourceType, alert_id: &str, title: &str, user: Uuid) -> AlertEnvelope {
        AlertEnvelope::new(
            source,
            alert_id,
            user,
            title,
            "checkout-api",
            Severity::High,
            HashMap::new(),
            Utc::now(),
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn test_store_once_dedups_on_content_hash() {
        let store = MemoryStore::new();
        let env = envelope(SourceType::Metrics, "mon-1", "cpu high", Uuid::new_v4());

        let first = store.store_once(&env).await.unwrap();
        let second = store.store_once(&env).await.unwrap();

        assert!(first.stored);
        assert!(!second.stored);
        assert_eq!(first.alert_id, second.alert_id);
        assert!(store.get_by_hash(&env.content_hash).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upsert_collision_collapses_to_one_row() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        // Same natural key, different content (log-search redelivery)
        let a = envelope(SourceType::LogSearch, "q-7", "oom in worker", user);
        let b = envelope(SourceType::LogSearch, "q-7", "oom in worker again", user);

        let first = store.upsert_primary(&a).await.unwrap();
        let second = store.upsert_primary(&b).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list_incidents(user).await.unwrap().len(), 1);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_started_at_frozen_after_analyzed() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let a = envelope(SourceType::LogSearch, "q-7", "oom", user);

        let incident = store.upsert_primary(&a).await.unwrap();
        store
            .set_status(incident.id, IncidentStatus::Analyzed)
            .await
            .unwrap();

        let mut b = envelope(SourceType::LogSearch, "q-7", "oom again", user);
        b.metadata.insert("host".to_string(), "w-3".to_string());
        let after = store.upsert_primary(&b).await.unwrap();

        assert_eq!(after.started_at, incident.started_at);
        assert!(after.updated_at >= incident.updated_at);
        assert_eq!(after.metadata.get("host").map(String::as_str), Some("w-3"));
    }

    #[tokio::test]
    async fn test_attach_increments_and_unions_once() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let primary = envelope(SourceType::Metrics, "mon-1", "cpu high", user);
        let incident = store.upsert_primary(&primary).await.unwrap();
        store
            .attach_primary(incident.id, Attribution::primary(&primary))
            .await
            .unwrap();

        for i in 0..2 {
            let env = envelope(SourceType::Metrics, &format!("mon-{}", i + 2), "cpu high", user);
            let attribution = Attribution::correlated(
                &env,
                CorrelationStrategy::TemporalServiceMatch,
                0.7,
                HashMap::new(),
            );
            store.attach_alert(incident.id, attribution).await.unwrap();
        }

        let incident = store.get(incident.id).await.unwrap().unwrap();
        assert_eq!(incident.correlated_alert_count, 3);
        // All three alerts share one service
        assert_eq!(incident.affected_services, vec!["checkout-api".to_string()]);
    }

    #[tokio::test]
    async fn test_attach_primary_is_partially_unique() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let env = envelope(SourceType::Metrics, "mon-1", "cpu high", user);
        let incident = store.upsert_primary(&env).await.unwrap();

        let first = store
            .attach_primary(incident.id, Attribution::primary(&env))
            .await
            .unwrap();
        let second = store
            .attach_primary(incident.id, Attribution::primary(&env))
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());

        let incident = store.get(incident.id).await.unwrap().unwrap();
        assert_eq!(incident.correlated_alert_count, 2);
        let rows = store.alerts_for_incident(incident.id).await.unwrap();
        let primaries = rows
            .iter()
            .filter(|r| r.strategy == CorrelationStrategy::Primary)
            .count();
        assert_eq!(primaries, 1);
    }

    #[tokio::test]
    async fn test_terminal_status_rejects_transitions() {
        let store = MemoryStore::new();
        let env = envelope(SourceType::Ci, "build-9", "build failed", Uuid::new_v4());
        let incident = store.upsert_primary(&env).await.unwrap();

        store
            .set_status(incident.id, IncidentStatus::Resolved)
            .await
            .unwrap();
        let result = store
            .set_status(incident.id, IncidentStatus::Investigating)
            .await;
        assert!(matches!(result, Err(Error::InvalidTransition(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_converge() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let env = envelope(SourceType::LogSearch, "q-1", &format!("hit {i}"), user);
                store.upsert_primary(&env).await.unwrap().id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(store.list_incidents(user).await.unwrap().len(), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
