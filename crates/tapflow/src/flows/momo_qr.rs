//! MoMo payment codes.
//!
//! The user picks a destination (their own number, another number or a
//! merchant code), optionally an amount, and receives the USSD string and a QR
//! image encoding it.

use tapflow_protocol::{Button, ListMessage, ListRow};
use tracing::info;

use super::home::back_home_button;
use super::{Flow, FlowContext, FlowError, FlowResult, Outcome, local_number, parse_amount};
use crate::router::Route;
use crate::state::FlowState;
use crate::store::{NewPaymentCode, PaymentCodeStore, PaymentTarget};

pub const LIST_ROUTES: &[Route] = &[
    Route::exact("momoqr_start", Flow::MomoQr),
    Route::prefix("mqr_", Flow::MomoQr),
];

pub const BUTTON_ROUTES: &[Route] = &[Route::prefix("mqr_", Flow::MomoQr)];

const ASK_AMOUNT: &str = "Enter the amount in RWF, or reply SKIP for any amount.";

pub async fn on_list(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    match id {
        "momoqr_start" | "mqr_again" => start(ctx).await?,
        "mqr_self" => {
            let target = PaymentTarget {
                value: local_number(ctx.phone()),
                is_code: false,
            };
            ctx.set_state(FlowState::MomoAwaitAmount(target)).await?;
            ctx.reply_text(ASK_AMOUNT).await?;
        }
        "mqr_number" => {
            ctx.set_state(FlowState::MomoAwaitNumber).await?;
            ctx.reply_text("Enter the MoMo number (e.g. 0788123456).")
                .await?;
        }
        "mqr_code" => {
            ctx.set_state(FlowState::MomoAwaitCode).await?;
            ctx.reply_text("Enter the MoMo merchant code.").await?;
        }
        _ => return Ok(Outcome::Declined),
    }
    Ok(Outcome::Handled)
}

pub async fn on_button(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    on_list(ctx, id).await
}

pub async fn on_text(ctx: &mut FlowContext<'_>, text: &str) -> FlowResult {
    let text = text.trim();
    match ctx.state.clone() {
        FlowState::MomoAwaitNumber => match normalize_number(text) {
            Some(value) => {
                let target = PaymentTarget {
                    value,
                    is_code: false,
                };
                ctx.set_state(FlowState::MomoAwaitAmount(target)).await?;
                ctx.reply_text(ASK_AMOUNT).await?;
            }
            None => {
                ctx.reply_text("Enter a valid MoMo number like 0788123456.")
                    .await?
            }
        },
        FlowState::MomoAwaitCode => match normalize_code(text) {
            Some(value) => {
                let target = PaymentTarget {
                    value,
                    is_code: true,
                };
                ctx.set_state(FlowState::MomoAwaitAmount(target)).await?;
                ctx.reply_text(ASK_AMOUNT).await?;
            }
            None => {
                ctx.reply_text("Enter a valid merchant code (4 to 9 digits).")
                    .await?
            }
        },
        FlowState::MomoAwaitAmount(target) => {
            if text.eq_ignore_ascii_case("skip") {
                issue(ctx, target, None).await?;
            } else if let Some(amount) = parse_amount(text) {
                issue(ctx, target, Some(amount)).await?;
            } else {
                ctx.reply_text("Enter a valid amount (numbers only), or reply SKIP.")
                    .await?;
            }
        }
        _ => return Ok(Outcome::Declined),
    }
    Ok(Outcome::Handled)
}

async fn start(ctx: &mut FlowContext<'_>) -> Result<(), FlowError> {
    ctx.clear_state().await?;
    ctx.reply_list(ListMessage::new(
        "MoMo QR",
        "Who should receive the payment?",
        "Choose",
        "Receiver",
        vec![
            ListRow::new("mqr_self", "My number").with_description("This WhatsApp number"),
            ListRow::new("mqr_number", "Another number").with_description("Any MoMo number"),
            ListRow::new("mqr_code", "Merchant code").with_description("MoMo Pay code"),
        ],
    ))
    .await
}

async fn issue(
    ctx: &mut FlowContext<'_>,
    target: PaymentTarget,
    amount: Option<i64>,
) -> Result<(), FlowError> {
    let ussd = ussd(&target, amount);
    let request = ctx
        .store()
        .create_payment_code(NewPaymentCode {
            user_id: ctx.user_id().to_string(),
            target,
            amount,
            ussd: ussd.clone(),
        })
        .await?;
    ctx.clear_state().await?;
    info!(request_id = %request.id, user_id = ctx.user_id(), "Payment code issued");

    let caption = match amount {
        Some(amount) => format!("Scan or dial {ussd} to pay RWF {amount}."),
        None => format!("Scan or dial {ussd} to pay."),
    };
    let qr = ctx.services.share.qr_url(&format!("tel:{ussd}"));
    ctx.reply_image(qr, Some(caption)).await?;
    ctx.reply_buttons(
        "Need another code?",
        vec![Button::new("mqr_again", "New code"), back_home_button()],
    )
    .await
}

/// USSD dial string for a MoMo transfer or merchant payment.
pub fn ussd(target: &PaymentTarget, amount: Option<i64>) -> String {
    let service = if target.is_code { "8" } else { "1" };
    match amount {
        Some(amount) => format!("*182*{service}*1*{}*{amount}#", target.value),
        None => format!("*182*{service}*1*{}#", target.value),
    }
}

/// Local `07…` form of a Rwandan mobile number typed in any common format.
fn normalize_number(text: &str) -> Option<String> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    let local = match digits.len() {
        10 => digits,
        12 if digits.starts_with("250") => format!("0{}", &digits[3..]),
        9 => format!("0{digits}"),
        _ => return None,
    };
    local.starts_with("07").then_some(local)
}

fn normalize_code(text: &str) -> Option<String> {
    let code = text.trim();
    let valid = (4..=9).contains(&code.len()) && code.chars().all(|c| c.is_ascii_digit());
    valid.then(|| code.to_string())
}
