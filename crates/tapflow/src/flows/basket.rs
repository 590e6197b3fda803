//! Funding baskets.
//!
//! Three machines share this module:
//!
//! - creation: `await_basket_name` → `await_basket_desc` → `await_basket_type`
//!   → `await_basket_momo` → `await_basket_confirm` → commit;
//! - actions on an existing basket (details, contribute, share, members, join,
//!   leave, close), driven by `bk_*` buttons;
//! - contributions: `await_contrib_amount` creates a pending contribution and
//!   sends approve/reject buttons to the basket's creator.
//!
//! Every basket or contribution id read from a control is fetched again before
//! use, and creator-only actions compare against the stored creator.

use tapflow_protocol::{Button, ListMessage, ListRow, OutboundMessage};
use tracing::{info, warn};

use super::home::BACK_HOME;
use super::{Flow, FlowContext, FlowError, FlowResult, Outcome, local_number, parse_amount};
use crate::router::Route;
use crate::state::{BasketDraft, BasketRef, FlowState, NamedBasket};
use crate::store::{
    Basket, BasketStatus, BasketStore, ContributionStatus, NewBasket, PaymentTarget, Visibility,
    new_id,
};

pub const LIST_ROUTES: &[Route] = &[
    Route::exact("baskets", Flow::Basket),
    Route::exact("bk_new", Flow::Basket),
    Route::exact("bk_join_code", Flow::Basket),
    Route::prefix("b_", Flow::Basket),
];

pub const BUTTON_ROUTES: &[Route] = &[Route::prefix("bk_", Flow::Basket)];

const JOIN_PREFIX: &str = "JOIN_BASKET:";
const MEMBERS_PAGE: usize = 5;
const NO_MORE_MEMBERS: &str = "No more members to show.";

// ============================================================================
// Entry points
// ============================================================================

pub async fn on_list(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    match id {
        "baskets" => show_menu(ctx).await?,
        "bk_new" => {
            ctx.set_state(FlowState::AwaitBasketName).await?;
            ctx.reply_text("What is the basket name?").await?;
        }
        "bk_join_code" => {
            ctx.reply_text("Send the JOIN_BASKET:<code> you received.")
                .await?;
        }
        _ => {
            let Some(basket_id) = id.strip_prefix("b_") else {
                return Ok(Outcome::Declined);
            };
            if let Some(basket) = fetch(ctx, basket_id).await? {
                show_actions(ctx, &basket).await?;
            }
        }
    }
    Ok(Outcome::Handled)
}

pub async fn on_button(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    if let Some(kind) = id.strip_prefix("bk_type_") {
        return choose_visibility(ctx, kind).await;
    }
    if let Some(rest) = id.strip_prefix("bk_mems_") {
        let Some((basket_id, page)) = rest.rsplit_once('_') else {
            return Ok(Outcome::Declined);
        };
        let Ok(page) = page.parse::<usize>() else {
            return Ok(Outcome::Declined);
        };
        show_members(ctx, basket_id, page).await?;
        return Ok(Outcome::Handled);
    }
    if let Some(contribution_id) = id.strip_prefix("bk_appr_") {
        resolve(ctx, contribution_id, ContributionStatus::Approved).await?;
        return Ok(Outcome::Handled);
    }
    if let Some(contribution_id) = id.strip_prefix("bk_rej_") {
        resolve(ctx, contribution_id, ContributionStatus::Rejected).await?;
        return Ok(Outcome::Handled);
    }

    let Some((action, basket_id)) = id
        .strip_prefix("bk_")
        .and_then(|rest| rest.split_once('_'))
    else {
        return Ok(Outcome::Declined);
    };
    if !matches!(
        action,
        "det" | "cont" | "share" | "qr" | "join" | "leave" | "close"
    ) {
        return Ok(Outcome::Declined);
    }
    let Some(basket) = fetch(ctx, basket_id).await? else {
        return Ok(Outcome::Handled);
    };

    match action {
        "det" => {
            ctx.reply_text(format!(
                "Basket: {}\nType: {}\nStatus: {}\nDescription: {}",
                basket.name,
                basket.visibility,
                basket.status,
                basket.description.as_deref().unwrap_or("(none)"),
            ))
            .await?;
        }
        "cont" => {
            if basket.status == BasketStatus::Closed {
                ctx.reply_text("This basket is closed.").await?;
            } else {
                ctx.set_state(FlowState::AwaitContribAmount(BasketRef {
                    basket_id: basket.id.clone(),
                }))
                .await?;
                ctx.reply_text("Enter contribution amount (RWF).").await?;
            }
        }
        "share" => send_share(ctx, &basket).await?,
        "qr" => send_qr(ctx, &basket).await?,
        "join" => {
            if basket.status == BasketStatus::Closed {
                ctx.reply_text("This basket is closed.").await?;
            } else {
                ctx.store().ensure_member(&basket.id, ctx.user_id()).await?;
                ctx.reply_text("Joined the basket successfully.").await?;
            }
        }
        "leave" => {
            ctx.store().remove_member(&basket.id, ctx.user_id()).await?;
            ctx.reply_text("You have left the basket.").await?;
        }
        "close" => {
            if basket.creator_id != ctx.user_id() {
                ctx.reply_text("Only the creator can close this basket.")
                    .await?;
            } else {
                ctx.store()
                    .set_basket_status(&basket.id, BasketStatus::Closed)
                    .await?;
                info!(basket_id = %basket.id, user_id = ctx.user_id(), "Basket closed");
                ctx.reply_text("Basket closed.").await?;
            }
        }
        _ => return Ok(Outcome::Declined),
    }
    Ok(Outcome::Handled)
}

/// Claims `JOIN_BASKET:` codes in any state, plus text in the basket wait-states.
pub async fn on_text(ctx: &mut FlowContext<'_>, text: &str) -> FlowResult {
    let text = text.trim();
    if let Some(token) = join_token(text) {
        join_by_code(ctx, token).await?;
        return Ok(Outcome::Handled);
    }

    match ctx.state.clone() {
        FlowState::AwaitBasketName => {
            if text.is_empty() {
                ctx.reply_text("Name cannot be empty.").await?;
            } else {
                ctx.set_state(FlowState::AwaitBasketDesc(NamedBasket::new(text)))
                    .await?;
                ctx.reply_text("Describe the basket (optional).").await?;
            }
        }
        FlowState::AwaitBasketDesc(named) => {
            let description = optional(text).map(str::to_string);
            ctx.set_state(FlowState::AwaitBasketType(named.describe(description)))
                .await?;
            ask_visibility(ctx).await?;
        }
        FlowState::AwaitBasketType(_) => ask_visibility(ctx).await?,
        FlowState::AwaitBasketMomo(typed) => {
            let target = optional(text).and_then(PaymentTarget::parse);
            let draft = typed.with_payment_target(target);
            let summary = confirmation(&draft);
            ctx.set_state(FlowState::AwaitBasketConfirm(draft)).await?;
            ctx.reply_text(summary).await?;
        }
        FlowState::AwaitBasketConfirm(draft) => match text.to_ascii_lowercase().as_str() {
            "yes" => finalize(ctx, draft).await?,
            "no" => {
                ctx.clear_state().await?;
                ctx.reply_text("Cancelled basket creation.").await?;
                show_menu(ctx).await?;
            }
            _ => {
                ctx.reply_text("Reply YES to confirm or NO to cancel.")
                    .await?;
            }
        },
        FlowState::AwaitContribAmount(basket) => contribute(ctx, &basket.basket_id, text).await?,
        _ => return Ok(Outcome::Declined),
    }
    Ok(Outcome::Handled)
}

// ============================================================================
// Menus
// ============================================================================

pub async fn show_menu(ctx: &mut FlowContext<'_>) -> Result<(), FlowError> {
    let baskets = ctx.store().baskets_for_user(ctx.user_id()).await?;
    let mut rows: Vec<ListRow> = baskets
        .iter()
        .map(|b| {
            ListRow::new(format!("b_{}", b.id), &b.name)
                .with_description(&format!("{} • {}", b.visibility, b.status))
        })
        .collect();
    // Keep room for the two fixed rows.
    rows.truncate(tapflow_protocol::MAX_LIST_ROWS - 2);
    rows.push(ListRow::new("bk_new", "Create basket").with_description("Start a new basket"));
    rows.push(
        ListRow::new("bk_join_code", "Join via code")
            .with_description("Send JOIN_BASKET:<code>"),
    );

    ctx.set_state(FlowState::BasketMenu).await?;
    ctx.reply_list(ListMessage::new(
        "Baskets",
        "Manage or create baskets.",
        "Open",
        "Your Baskets",
        rows,
    ))
    .await
}

async fn show_actions(ctx: &FlowContext<'_>, basket: &Basket) -> Result<(), FlowError> {
    let id = &basket.id;
    let is_creator = basket.creator_id == ctx.user_id();
    let open = basket.status != BasketStatus::Closed;

    let mut buttons = vec![
        Button::new(format!("bk_det_{id}"), "Details"),
        Button::new(format!("bk_cont_{id}"), "Contribute"),
        Button::new(format!("bk_share_{id}"), "Share"),
        Button::new(format!("bk_qr_{id}"), "QR"),
        Button::new(format!("bk_mems_{id}_0"), "Members"),
    ];
    if open {
        buttons.push(Button::new(format!("bk_leave_{id}"), "Leave"));
    }
    if is_creator && open {
        buttons.push(Button::new(format!("bk_close_{id}"), "Close"));
    } else if !is_creator {
        buttons.push(Button::new(format!("bk_join_{id}"), "Join"));
    }

    let more = buttons.split_off(tapflow_protocol::MAX_BUTTONS.min(buttons.len()));
    ctx.reply_buttons(format!("Basket: {}", basket.name), buttons)
        .await?;
    if !more.is_empty() {
        ctx.reply_buttons("More actions", more).await?;
    }
    Ok(())
}

async fn show_members(
    ctx: &FlowContext<'_>,
    basket_id: &str,
    page: usize,
) -> Result<(), FlowError> {
    let Some(basket) = fetch(ctx, basket_id).await? else {
        return Ok(());
    };
    let Some(offset) = page.checked_mul(MEMBERS_PAGE) else {
        return ctx.reply_text(NO_MORE_MEMBERS).await;
    };
    let members = ctx
        .store()
        .members(&basket.id, offset, MEMBERS_PAGE)
        .await?;
    if members.is_empty() {
        return ctx.reply_text(NO_MORE_MEMBERS).await;
    }

    let lines: Vec<String> = members
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let who = m.phone.as_deref().map_or_else(|| m.user_id.clone(), local_number);
            format!("{}. {} • RWF {}", offset + i + 1, who, m.total_contributed)
        })
        .collect();
    let mut buttons = Vec::with_capacity(2);
    if let Some(next) = page.checked_add(1) {
        buttons.push(Button::new(format!("bk_mems_{}_{next}", basket.id), "More"));
    }
    buttons.push(Button::new(BACK_HOME, "Back"));
    ctx.reply_buttons(
        format!("Members of {}:\n{}", basket.name, lines.join("\n")),
        buttons,
    )
    .await
}

// ============================================================================
// Creation
// ============================================================================

async fn ask_visibility(ctx: &FlowContext<'_>) -> Result<(), FlowError> {
    ctx.reply_buttons(
        "Is this basket Public or Private?",
        vec![
            Button::new("bk_type_public", "Public"),
            Button::new("bk_type_private", "Private"),
        ],
    )
    .await
}

async fn choose_visibility(ctx: &mut FlowContext<'_>, kind: &str) -> FlowResult {
    let Some(visibility) = Visibility::parse(kind) else {
        return Ok(Outcome::Declined);
    };
    let FlowState::AwaitBasketType(described) = ctx.state.clone() else {
        return Ok(Outcome::Declined);
    };
    ctx.set_state(FlowState::AwaitBasketMomo(described.with_visibility(visibility)))
        .await?;
    ctx.reply_text("Provide MoMo number/code for contributions, or reply SKIP.")
        .await?;
    Ok(Outcome::Handled)
}

fn confirmation(draft: &BasketDraft) -> String {
    let momo = draft
        .payment_target
        .as_ref()
        .map_or("(none)", |t| t.value.as_str());
    format!(
        "Confirm basket creation?\nName: {}\nType: {}\nMoMo: {}\nReply YES to confirm or NO to cancel.",
        draft.name(),
        draft.visibility(),
        momo,
    )
}

/// Commit a confirmed draft. State is cleared before the menu is shown again.
async fn finalize(ctx: &mut FlowContext<'_>, draft: BasketDraft) -> Result<(), FlowError> {
    let visibility = draft.visibility();
    let public_slug = (visibility == Visibility::Public).then(|| public_slug(draft.name()));
    let new = NewBasket {
        name: draft.name().to_string(),
        description: draft.description().map(str::to_string),
        visibility,
        creator_id: ctx.user_id().to_string(),
        public_slug,
        payment_target: draft.payment_target,
    };

    let basket = match ctx.store().create_basket(new).await {
        Ok(basket) => basket,
        Err(e) => {
            warn!(user_id = ctx.user_id(), error = %e, "Basket creation failed");
            ctx.clear_state().await?;
            ctx.reply_text("Could not create basket. Try again later.")
                .await?;
            return show_menu(ctx).await;
        }
    };
    ctx.store().ensure_member(&basket.id, ctx.user_id()).await?;
    ctx.clear_state().await?;
    info!(basket_id = %basket.id, user_id = ctx.user_id(), visibility = %visibility, "Basket created");

    match visibility {
        Visibility::Public => {
            ctx.reply_text(
                "Basket created and sent for review. We'll notify you once approved.",
            )
            .await?;
        }
        Visibility::Private => {
            ctx.reply_text("✅ Basket created! You can share it now.")
                .await?;
            send_share(ctx, &basket).await?;
        }
    }
    show_menu(ctx).await
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "basket".to_string()
    } else {
        slug.to_string()
    }
}

fn public_slug(name: &str) -> String {
    let id = new_id();
    format!("{}-{}", slugify(name), &id[id.len() - 6..])
}

// ============================================================================
// Sharing and joining
// ============================================================================

async fn join_link(ctx: &FlowContext<'_>, basket: &Basket) -> Result<String, FlowError> {
    let prefill = format!("{JOIN_PREFIX}{}", basket.share_token());
    Ok(ctx.services.share.bot_link(Some(&prefill)).await?)
}

async fn send_share(ctx: &FlowContext<'_>, basket: &Basket) -> Result<(), FlowError> {
    let link = join_link(ctx, basket).await?;
    ctx.reply_text(format!(
        "Share this basket link:\n{link}\nUse code: {JOIN_PREFIX}{}",
        basket.share_token()
    ))
    .await?;
    ctx.reply_image(
        ctx.services.share.qr_url(&link),
        Some(format!("{} basket QR", basket.name)),
    )
    .await
}

async fn send_qr(ctx: &FlowContext<'_>, basket: &Basket) -> Result<(), FlowError> {
    let link = join_link(ctx, basket).await?;
    ctx.reply_image(
        ctx.services.share.qr_url(&link),
        Some(format!("{} basket QR", basket.name)),
    )
    .await
}

/// The token after a case-insensitive `JOIN_BASKET:` prefix.
fn join_token(text: &str) -> Option<&str> {
    let head = text.get(..JOIN_PREFIX.len())?;
    head.eq_ignore_ascii_case(JOIN_PREFIX)
        .then(|| text[JOIN_PREFIX.len()..].trim())
}

async fn join_by_code(ctx: &mut FlowContext<'_>, token: &str) -> Result<(), FlowError> {
    if token.is_empty() {
        return ctx.reply_text("Invalid code.").await;
    }
    let Some(basket) = ctx.store().find_basket_by_token(token).await? else {
        return ctx.reply_text("No basket found for that code.").await;
    };
    if basket.status == BasketStatus::Closed {
        return ctx.reply_text("This basket is closed.").await;
    }
    ctx.store().ensure_member(&basket.id, ctx.user_id()).await?;
    ctx.reply_text(format!("Joined basket {}.", basket.name))
        .await?;
    show_actions(ctx, &basket).await
}

// ============================================================================
// Contributions
// ============================================================================

async fn contribute(ctx: &mut FlowContext<'_>, basket_id: &str, text: &str) -> Result<(), FlowError> {
    let Some(amount) = parse_amount(text) else {
        return ctx.reply_text("Enter a valid amount (numbers only).").await;
    };
    let Some(basket) = fetch(ctx, basket_id).await? else {
        return ctx.clear_state().await;
    };
    if basket.status == BasketStatus::Closed {
        ctx.clear_state().await?;
        return ctx.reply_text("This basket is closed.").await;
    }

    ctx.store().ensure_member(&basket.id, ctx.user_id()).await?;
    let contribution = ctx
        .store()
        .add_contribution(&basket.id, ctx.user_id(), amount)
        .await?;
    info!(
        basket_id = %basket.id,
        contribution_id = %contribution.id,
        amount,
        "Contribution submitted"
    );

    let request = OutboundMessage::buttons(
        format!(
            "Contribution request: RWF {amount} from {} for {}",
            local_number(ctx.phone()),
            basket.name
        ),
        vec![
            Button::new(format!("bk_appr_{}", contribution.id), "Approve"),
            Button::new(format!("bk_rej_{}", contribution.id), "Reject"),
        ],
    );
    ctx.notify_user(&basket.creator_id, request).await?;

    ctx.reply_text("Contribution submitted for approval.").await?;
    ctx.clear_state().await?;
    show_menu(ctx).await
}

/// Approve or reject a pending contribution as the basket's creator.
async fn resolve(
    ctx: &FlowContext<'_>,
    contribution_id: &str,
    decision: ContributionStatus,
) -> Result<(), FlowError> {
    let Some(contribution) = ctx.store().get_contribution(contribution_id).await? else {
        return ctx.reply_text("Contribution not found.").await;
    };
    let Some(basket) = fetch(ctx, &contribution.basket_id).await? else {
        return Ok(());
    };
    if basket.creator_id != ctx.user_id() {
        warn!(
            user_id = ctx.user_id(),
            contribution_id,
            "Contribution decision refused for non-creator"
        );
        let refusal = match decision {
            ContributionStatus::Rejected => "Only the creator can reject contributions.",
            _ => "Only the creator can approve contributions.",
        };
        return ctx.reply_text(refusal).await;
    }

    let resolved = ctx
        .store()
        .resolve_contribution(&contribution.id, decision, ctx.user_id())
        .await?;
    if !resolved {
        return ctx
            .reply_text("This contribution was already handled.")
            .await;
    }

    match decision {
        ContributionStatus::Approved => {
            ctx.store()
                .credit_member(&basket.id, &contribution.contributor_id, contribution.amount)
                .await?;
            ctx.notify_user(
                &contribution.contributor_id,
                OutboundMessage::text("✅ Contribution approved! Thank you."),
            )
            .await?;
            ctx.reply_text("Contribution approved.").await?;
        }
        _ => {
            ctx.notify_user(
                &contribution.contributor_id,
                OutboundMessage::text("❌ Contribution rejected by the basket creator."),
            )
            .await?;
            ctx.reply_text("Contribution rejected.").await?;
        }
    }
    info!(contribution_id, decision = %decision, "Contribution resolved");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Re-read a basket named by a control id, telling the user when it is gone.
async fn fetch(ctx: &FlowContext<'_>, basket_id: &str) -> Result<Option<Basket>, FlowError> {
    let basket = ctx.store().get_basket(basket_id).await?;
    if basket.is_none() {
        ctx.reply_text("Basket not found.").await?;
    }
    Ok(basket)
}

/// `None` for an empty reply or `skip`.
fn optional(text: &str) -> Option<&str> {
    let text = text.trim();
    (!text.is_empty() && !text.eq_ignore_ascii_case("skip")).then_some(text)
}
