use elderlink::wire::{Envelope, MessageType, build_error};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Option<Envelope>> + Send>>;
type Handler = Arc<dyn Fn(Envelope) -> HandlerFuture + Send + Sync>;

/// Dispatch table from message type to handler.
///
/// Every handler has the same shape: it takes the decoded envelope and
/// yields the reply, if any. Frames that cannot be decoded and types with no
/// handler are logged and dropped without a reply.
pub struct MessageRouter {
    elder_id: String,
    handlers: HashMap<MessageType, Handler>,
}

impl MessageRouter {
    pub fn new(elder_id: impl Into<String>) -> Self {
        Self {
            elder_id: elder_id.into(),
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `kind`, replacing any earlier one.
    pub fn register<F, Fut>(&mut self, kind: MessageType, handler: F) -> &mut Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Envelope>> + Send + 'static,
    {
        self.handlers
            .insert(kind, Arc::new(move |env| Box::pin(handler(env))));
        self
    }

    pub fn handles(&self, kind: MessageType) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Decode a raw text frame and dispatch it.
    pub async fn route(&self, text: &str) -> Option<Envelope> {
        match Envelope::decode(text) {
            Ok(env) => self.dispatch(env).await,
            Err(e) => {
                tracing::warn!(err = %e, len = text.len(), "dropping undecodable frame");
                None
            }
        }
    }

    /// Run the handler registered for the envelope's type.
    ///
    /// A panicking handler still answers request types with a `command_error`
    /// carrying the original request id.
    pub async fn dispatch(&self, env: Envelope) -> Option<Envelope> {
        let Some(kind) = env.message_type() else {
            tracing::warn!(kind = %env.kind, from = %env.from, "dropping frame of unknown type");
            return None;
        };
        if kind == MessageType::ConnectionAck {
            tracing::debug!("relay acknowledged connection");
            return None;
        }
        let Some(handler) = self.handlers.get(&kind).cloned() else {
            tracing::warn!(kind = %kind, from = %env.from, "no handler registered, dropping");
            return None;
        };

        let header = Envelope {
            payload: None,
            kind: env.kind.clone(),
            from: env.from.clone(),
            to: env.to.clone(),
            request_id: env.request_id.clone(),
            timestamp: env.timestamp.clone(),
        };

        match AssertUnwindSafe(async move { handler(env).await })
            .catch_unwind()
            .await
        {
            Ok(reply) => reply,
            Err(panic) => {
                tracing::error!(
                    kind = %kind,
                    request_id = %header.request_id,
                    panic = panic_message(&*panic),
                    "handler panicked"
                );
                kind.expects_response().then(|| {
                    build_error(&self.elder_id, &header, format!("Internal error handling {kind}"))
                })
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elderlink::wire::build_response;

    fn request(kind: &str, request_id: &str) -> String {
        serde_json::json!({
            "type": kind,
            "from": "guardian-1",
            "to": "elder_1",
            "requestId": request_id,
            "timestamp": "2024-01-01T00:00:00Z"
        })
        .to_string()
    }

    fn echo_router() -> MessageRouter {
        let mut router = MessageRouter::new("elder_1");
        router.register(MessageType::GetState, |env: Envelope| async move {
            Some(build_response(
                "elder_1",
                &env,
                MessageType::StateResponse,
                Ok(serde_json::json!({})),
            ))
        });
        router
    }

    #[tokio::test]
    async fn routes_by_type_any_case() {
        let router = echo_router();
        let reply = router.route(&request("GET_STATE", "r1")).await.unwrap();
        assert_eq!(reply.message_type(), Some(MessageType::StateResponse));
        assert_eq!(reply.request_id, "r1");
        assert_eq!(reply.to, "guardian-1");
    }

    #[tokio::test]
    async fn drops_garbage_unknown_and_unhandled() {
        let router = echo_router();
        assert!(router.route("{{{").await.is_none());
        assert!(router.route(&request("self_destruct", "r2")).await.is_none());
        assert!(router.route(&request("get_medications", "r3")).await.is_none());
        assert!(router.route(&request("connection_ack", "r4")).await.is_none());
    }

    fn explode(env: Envelope) -> Option<Envelope> {
        panic!("handler for {} exploded", env.kind);
    }

    #[tokio::test]
    async fn panicking_request_handler_still_answers() {
        let mut router = MessageRouter::new("elder_1");
        router.register(MessageType::DeleteMedication, |env: Envelope| async move {
            explode(env)
        });
        router.register(MessageType::GuardianPaired, |env: Envelope| async move {
            explode(env)
        });

        let reply = router
            .route(&request("delete_medication", "req-77"))
            .await
            .unwrap();
        assert_eq!(reply.message_type(), Some(MessageType::CommandError));
        assert_eq!(reply.request_id, "req-77");
        assert_eq!(reply.to, "guardian-1");
        assert_eq!(
            reply.payload.unwrap()["error"],
            "Internal error handling delete_medication"
        );

        assert!(router.route(&request("guardian_paired", "e1")).await.is_none());
    }
}
