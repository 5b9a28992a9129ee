//! Resource handler trait.
//!
//! A handler implements the actions its descriptor declares. The dispatcher
//! only ever calls an action method after checking the descriptor's action
//! set, so undeclared actions can keep the default body.

use async_trait::async_trait;

use rsdispatch_domain::{Action, Verdict};

use crate::interaction::Context;

/// Result of a handler method. Errors become a single `platform.fault`.
pub type HandlerResult = anyhow::Result<()>;

fn not_implemented(action: Action) -> anyhow::Error {
    anyhow::anyhow!("handler does not implement '{action}'")
}

/// Implementation of one resource version.
#[async_trait]
pub trait ResourceHandler: Send + Sync + 'static {
    async fn list(&self, _ctx: &mut Context) -> HandlerResult {
        Err(not_implemented(Action::List))
    }

    async fn show(&self, _ctx: &mut Context) -> HandlerResult {
        Err(not_implemented(Action::Show))
    }

    async fn create(&self, _ctx: &mut Context) -> HandlerResult {
        Err(not_implemented(Action::Create))
    }

    async fn update(&self, _ctx: &mut Context) -> HandlerResult {
        Err(not_implemented(Action::Update))
    }

    async fn delete(&self, _ctx: &mut Context) -> HandlerResult {
        Err(not_implemented(Action::Delete))
    }

    /// Runs before the action method. Recording an error skips the action.
    async fn before(&self, _ctx: &mut Context) -> HandlerResult {
        Ok(())
    }

    /// Runs after the action method, even when it recorded errors.
    async fn after(&self, _ctx: &mut Context) -> HandlerResult {
        Ok(())
    }

    /// Decides an `ask` verdict once the request is fully parsed, list
    /// parameters and body included.
    async fn verify(&self, _ctx: &Context, _action: Action) -> anyhow::Result<Verdict> {
        Ok(Verdict::Deny)
    }
}

/// Calls the action method for `action`.
pub(crate) async fn invoke(
    handler: &dyn ResourceHandler,
    action: Action,
    ctx: &mut Context,
) -> HandlerResult {
    match action {
        Action::List => handler.list(ctx).await,
        Action::Show => handler.show(ctx).await,
        Action::Create => handler.create(ctx).await,
        Action::Update => handler.update(ctx).await,
        Action::Delete => handler.delete(ctx).await,
    }
}
