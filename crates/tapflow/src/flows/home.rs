//! Home menu and sharing.

use tapflow_protocol::{Button, ListMessage, ListRow};

use super::{Flow, FlowContext, FlowError, FlowResult, Outcome};
use crate::router::Route;

pub const BACK_HOME: &str = "back_home";

pub const LIST_ROUTES: &[Route] = &[];

pub const BUTTON_ROUTES: &[Route] = &[
    Route::exact(BACK_HOME, Flow::Home),
    Route::exact("share_link", Flow::Home),
    Route::exact("share_qr", Flow::Home),
];

/// Entry rows, each owned by the flow that registers its id.
const MENU: &[(&str, &str, &str)] = &[
    ("see_drivers", "Nearby drivers", "Find drivers around you"),
    ("see_passengers", "Nearby passengers", "Find passengers around you"),
    ("schedule_trip", "Schedule a trip", "Offer or request a ride"),
    ("marketplace", "Marketplace", "List or discover businesses"),
    ("baskets", "Baskets", "Group savings and contributions"),
    ("motor_insurance", "Motor insurance", "Send your documents for a quote"),
    ("momoqr_start", "MoMo QR", "Create a payment code"),
];

pub fn back_home_button() -> Button {
    Button::new(BACK_HOME, "Back to Menu")
}

pub async fn send_menu(ctx: &FlowContext<'_>) -> Result<(), FlowError> {
    let rows = MENU
        .iter()
        .map(|(id, title, description)| ListRow::new(*id, title).with_description(description))
        .collect();
    ctx.reply_list(ListMessage::new(
        "Home",
        "What would you like to do?",
        "Open menu",
        "Services",
        rows,
    ))
    .await?;
    ctx.reply_buttons(
        "Invite friends to chat with us.",
        vec![
            Button::new("share_link", "Share link"),
            Button::new("share_qr", "Share QR"),
        ],
    )
    .await
}

pub async fn on_button(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    match id {
        BACK_HOME => {
            ctx.clear_state().await?;
            send_menu(ctx).await?;
        }
        "share_link" => {
            let link = ctx.services.share.bot_link(None).await?;
            ctx.reply_text(format!("Share this link with friends:\n{link}"))
                .await?;
        }
        "share_qr" => {
            let link = ctx.services.share.bot_link(None).await?;
            let qr = ctx.services.share.qr_url(&link);
            ctx.reply_image(qr, Some("Scan to chat with us".to_string()))
                .await?;
        }
        _ => return Ok(Outcome::Declined),
    }
    Ok(Outcome::Handled)
}
