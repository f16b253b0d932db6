//! Entry point for triggering mapped notifications.
//!
//! [`MailMapper::notify`] resolves the template for a (module, menu, task)
//! triple, renders it against the caller's context and queues the delivery.
//! It reports only whether a job was queued; everything after that happens on
//! the delivery worker.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attachment::{AttachmentInput, AttachmentNormalizer};
use crate::delivery::{DeliveryError, DeliveryQueue, EmailPayload};
use crate::mapping::{normalize_meta, MappingKey, MappingService, StoreError};
use crate::metrics::NotifyMetrics;
use crate::placeholder::{
    build_email_data, placeholders_from_context, Context, ResolveOutcome, ACTOR_EMAIL, ACTOR_NAME,
};
use crate::resolver::MappingResolver;

/// Context key holding attachments rather than a placeholder value
pub const ATTACHMENTS_KEY: &str = "attachments";

/// The user on whose behalf a notification is sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NotifyRequest {
    pub context: Context,
    pub attachments: Vec<AttachmentInput>,
    pub actor: Option<Actor>,
    /// Send a bare message instead of the layout-wrapped one
    pub use_raw: bool,
}

impl NotifyRequest {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentInput>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn raw(mut self) -> Self {
        self.use_raw = true;
        self
    }
}

#[derive(Debug, thiserror::Error)]
enum NotifyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

pub struct MailMapper {
    resolver: Arc<MappingResolver>,
    mappings: Arc<MappingService>,
    normalizer: AttachmentNormalizer,
    queue: DeliveryQueue,
}

impl MailMapper {
    pub fn new(
        resolver: Arc<MappingResolver>,
        mappings: Arc<MappingService>,
        normalizer: AttachmentNormalizer,
        queue: DeliveryQueue,
    ) -> Self {
        Self {
            resolver,
            mappings,
            normalizer,
            queue,
        }
    }

    /// Queue the notification mapped to (module, menu, task).
    ///
    /// Returns false when no mapping matches, the mapping yields no valid
    /// recipient, or anything fails along the way.
    pub async fn notify(&self, module: &str, menu: &str, task: &str, context: Context) -> bool {
        self.notify_with(module, menu, task, NotifyRequest::new(context))
            .await
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn notify_with(
        &self,
        module: &str,
        menu: &str,
        task: &str,
        request: NotifyRequest,
    ) -> bool {
        let key = MappingKey::new(module, menu, task);

        match self.dispatch(&key, request).await {
            Ok(Ok(job_id)) => {
                NotifyMetrics::record("dispatched");
                tracing::info!(key = %key, job_id = %job_id, "Email mapping triggered");
                true
            }
            Ok(Err(ResolveOutcome::NotFound)) => {
                NotifyMetrics::record("not_found");
                tracing::info!(key = %key, "No email mapping found");
                false
            }
            Ok(Err(ResolveOutcome::NoRecipients { mapping_id })) => {
                NotifyMetrics::record("no_recipients");
                tracing::info!(key = %key, mapping_id, "Email mapping has no valid recipients");
                false
            }
            Err(e) => {
                NotifyMetrics::record("error");
                tracing::error!(key = %key, error = %e, "Email mapping notification failed");
                false
            }
        }
    }

    async fn dispatch(
        &self,
        key: &MappingKey,
        request: NotifyRequest,
    ) -> Result<Result<uuid::Uuid, ResolveOutcome>, NotifyError> {
        let NotifyRequest {
            mut context,
            mut attachments,
            actor,
            use_raw,
        } = request;

        if let Some(value) = context.remove(ATTACHMENTS_KEY) {
            attachments.extend(AttachmentInput::list_from_json(&value));
        }

        let mut meta = placeholders_from_context(&context);
        if let Some(actor) = actor {
            // Values already in the context take precedence
            if let Some(name) = actor.name {
                context
                    .entry(ACTOR_NAME)
                    .or_insert_with(|| Value::String(name));
            }
            if let Some(email) = actor.email {
                context
                    .entry(ACTOR_EMAIL)
                    .or_insert_with(|| Value::String(email));
            }
            meta.push(format!("{{{}}}", ACTOR_NAME));
            meta.push(format!("{{{}}}", ACTOR_EMAIL));
        }
        let meta = normalize_meta(meta);

        self.mappings.sync_meta(key, &meta).await?;

        let Some(mapping) = self.resolver.resolve(key).await? else {
            return Ok(Err(ResolveOutcome::NotFound));
        };
        let data = match build_email_data(&mapping, &context) {
            Ok(data) => data,
            Err(outcome) => return Ok(Err(outcome)),
        };

        let attachments = self.normalizer.normalize(attachments);
        let payload = EmailPayload::from_email_data(data, meta, attachments, use_raw);
        Ok(Ok(self.queue.enqueue(payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryMappingCache;
    use crate::config::{ApiConfig, CacheConfig};
    use crate::delivery::DeliveryJob;
    use crate::mapping::{MappingStore, MemoryMappingStore, NewMapping};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        mapper: MailMapper,
        store: Arc<MemoryMappingStore>,
        jobs: mpsc::UnboundedReceiver<DeliveryJob>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryMappingStore::new());
        let cache = Arc::new(MemoryMappingCache::new());
        let resolver = Arc::new(MappingResolver::new(
            store.clone(),
            cache,
            &CacheConfig::default(),
        ));
        let service = Arc::new(MappingService::new(resolver.clone(), &ApiConfig::default()));
        let (queue, jobs) = DeliveryQueue::channel();
        let mapper = MailMapper::new(
            resolver,
            service,
            AttachmentNormalizer::with_roots(Vec::new(), 1),
            queue,
        );
        Fixture {
            mapper,
            store,
            jobs,
        }
    }

    fn context(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    async fn insert(store: &MemoryMappingStore, key: MappingKey, to: &[&str], body: &str) -> i64 {
        let mut mapping = NewMapping::new(key);
        mapping.to = to.iter().map(|s| s.to_string()).collect();
        mapping.body = Some(body.to_string());
        store.insert(mapping).await.unwrap().id
    }

    #[tokio::test]
    async fn test_notify_queues_rendered_payload() {
        let mut f = fixture();
        insert(
            &f.store,
            MappingKey::new("Sales", "Leads", "Create"),
            &["{client_email}"],
            "Hi {client_name}",
        )
        .await;

        let dispatched = f
            .mapper
            .notify(
                "Sales",
                "Leads",
                "Create",
                context(json!({ "client_email": "c@x.com", "client_name": "Acme" })),
            )
            .await;

        assert!(dispatched);
        let job = f.jobs.try_recv().unwrap();
        assert_eq!(job.payload.to, vec!["c@x.com"]);
        assert_eq!(job.payload.body, "Hi Acme");
        assert_eq!(job.payload.subject, "Notification");
    }

    #[tokio::test]
    async fn test_missing_mapping_returns_false() {
        let mut f = fixture();
        assert!(!f.mapper.notify("HR", "Leave", "Approve", Context::new()).await);
        assert!(f.jobs.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_recipients_returns_false() {
        let mut f = fixture();
        insert(&f.store, MappingKey::new("*", "*", "*"), &["{nobody}"], "x").await;

        assert!(!f.mapper.notify("A", "B", "C", Context::new()).await);
        assert!(f.jobs.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_meta_synced_on_exact_mapping() {
        let f = fixture();
        let key = MappingKey::new("Sales", "Leads", "Create");
        let id = insert(&f.store, key, &["ops@example.com"], "x").await;

        let request = NotifyRequest::new(context(json!({ "lead_name": "Acme" }))).with_actor(Actor {
            name: Some("Dana".to_string()),
            email: Some("dana@example.com".to_string()),
        });
        assert!(f.mapper.notify_with("Sales", "Leads", "Create", request).await);

        let stored = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(
            stored.meta,
            vec!["{lead_name}", "{actor_name}", "{actor_email}"]
        );
    }

    #[tokio::test]
    async fn test_actor_email_copied_when_meta_lists_it() {
        let mut f = fixture();
        insert(
            &f.store,
            MappingKey::new("Sales", "Leads", "Create"),
            &["ops@example.com"],
            "x",
        )
        .await;

        let request = NotifyRequest::new(Context::new()).with_actor(Actor {
            name: None,
            email: Some("dana@example.com".to_string()),
        });
        assert!(f.mapper.notify_with("Sales", "Leads", "Create", request).await);

        let job = f.jobs.try_recv().unwrap();
        assert_eq!(job.payload.cc, vec!["dana@example.com"]);
    }

    #[tokio::test]
    async fn test_context_attachments_are_not_placeholders() {
        let mut f = fixture();
        let key = MappingKey::new("Docs", "Quotes", "Send");
        let id = insert(&f.store, key, &["ops@example.com"], "Quote attached").await;

        let dispatched = f
            .mapper
            .notify(
                "Docs",
                "Quotes",
                "Send",
                context(json!({
                    "quote_no": 7,
                    "attachments": ["https://files.example.com/q-7.pdf", "/no/such/file.pdf"]
                })),
            )
            .await;
        assert!(dispatched);

        let job = f.jobs.try_recv().unwrap();
        assert_eq!(job.payload.attachments.len(), 1);
        assert_eq!(job.payload.attachments[0].filename(), "q-7.pdf");
        assert!(job.payload.attachments[0].is_remote());

        let stored = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.meta, vec!["{quote_no}"]);
    }

    #[tokio::test]
    async fn test_closed_queue_returns_false() {
        let f = fixture();
        insert(
            &f.store,
            MappingKey::new("*", "*", "*"),
            &["ops@example.com"],
            "x",
        )
        .await;
        drop(f.jobs);

        assert!(!f.mapper.notify("A", "B", "C", Context::new()).await);
    }

    #[tokio::test]
    async fn test_raw_request_flags_payload() {
        let mut f = fixture();
        insert(
            &f.store,
            MappingKey::new("*", "*", "*"),
            &["ops@example.com"],
            "x",
        )
        .await;

        let request = NotifyRequest::new(Context::new()).raw();
        assert!(f.mapper.notify_with("A", "B", "C", request).await);
        assert!(f.jobs.try_recv().unwrap().payload.use_raw);
    }
}
