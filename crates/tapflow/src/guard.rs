//! Global commands honoured in every state.
//!
//! Only the message text and any control id are inspected, never the current
//! state, so a user can always leave a stuck flow.

use tapflow_protocol::InboundMessage;
use tracing::info;

use crate::flows::home::{self, BACK_HOME};
use crate::flows::{FlowContext, FlowError};
use crate::store::ContactStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Handled,
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    OptOut,
    OptIn,
    Home,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::OptOut => "opt_out",
            Command::OptIn => "opt_in",
            Command::Home => "home",
        }
    }
}

/// The global command carried by `message`, if any.
pub fn command(message: &InboundMessage) -> Option<Command> {
    if message.control_id() == Some(BACK_HOME) {
        return Some(Command::Home);
    }
    let text = message.text()?.trim().to_lowercase();
    match text.as_str() {
        "stop" | "unsubscribe" => Some(Command::OptOut),
        "start" | "subscribe" => Some(Command::OptIn),
        "home" | "menu" => Some(Command::Home),
        _ => None,
    }
}

/// Run the global command in `message`, if any. Every command resets the
/// conversation to `home`.
pub async fn apply(
    ctx: &mut FlowContext<'_>,
    message: &InboundMessage,
) -> Result<GuardOutcome, FlowError> {
    let Some(command) = command(message) else {
        return Ok(GuardOutcome::PassThrough);
    };
    info!(
        user_id = ctx.user_id(),
        state = ctx.state.key(),
        command = command.as_str(),
        "Global command"
    );
    ctx.clear_state().await?;

    match command {
        Command::OptOut => {
            ctx.store().set_opted_out(ctx.user_id(), true).await?;
            ctx.contact.opted_out = true;
            ctx.reply_text("You have been unsubscribed. Reply START to subscribe again.")
                .await?;
        }
        Command::OptIn => {
            ctx.store().set_opted_out(ctx.user_id(), false).await?;
            ctx.contact.opted_out = false;
            ctx.reply_text("Welcome back! You are subscribed again.")
                .await?;
            home::send_menu(ctx).await?;
        }
        Command::Home => home::send_menu(ctx).await?,
    }
    Ok(GuardOutcome::Handled)
}

#[cfg(test)]
mod tests {
    use tapflow_protocol::{MessageKind, Reply};

    use super::*;
    use crate::flows::testing::Harness;
    use crate::state::{BasketRef, FlowState};

    const PHONE: &str = "250788000001";

    fn text(body: &str) -> InboundMessage {
        InboundMessage {
            sender: Some(PHONE.into()),
            id: Some("wamid.1".into()),
            timestamp: None,
            profile_name: None,
            kind: MessageKind::Text { body: body.into() },
        }
    }

    fn button(id: &str) -> InboundMessage {
        InboundMessage {
            kind: MessageKind::ButtonReply(Reply {
                id: id.into(),
                title: None,
            }),
            ..text("")
        }
    }

    #[test]
    fn recognises_commands() {
        assert_eq!(command(&text("  STOP ")), Some(Command::OptOut));
        assert_eq!(command(&text("Subscribe")), Some(Command::OptIn));
        assert_eq!(command(&text("menu")), Some(Command::Home));
        assert_eq!(command(&button(BACK_HOME)), Some(Command::Home));
        assert_eq!(command(&text("stop it")), None);
        assert_eq!(command(&button("home")), None);
    }

    #[tokio::test]
    async fn stop_mid_contribution_opts_out_and_clears() {
        let harness = Harness::new();
        let mut ctx = harness
            .ctx_in(
                PHONE,
                FlowState::AwaitContribAmount(BasketRef {
                    basket_id: "b1".into(),
                }),
            )
            .await;

        assert_eq!(apply(&mut ctx, &text("STOP")).await.unwrap(), GuardOutcome::Handled);
        assert_eq!(harness.state_of(PHONE).await, FlowState::Home);
        let contact = harness.ctx(PHONE).await.contact;
        assert!(contact.opted_out);
        assert!(harness.store.contributions().await.is_empty());
    }

    #[tokio::test]
    async fn other_text_passes_through() {
        let harness = Harness::new();
        let mut ctx = harness.ctx_in(PHONE, FlowState::AwaitBasketName).await;
        assert_eq!(
            apply(&mut ctx, &text("Harvest")).await.unwrap(),
            GuardOutcome::PassThrough
        );
        assert_eq!(harness.state_of(PHONE).await, FlowState::AwaitBasketName);
        assert!(harness.messenger.sent().await.is_empty());
    }
}
