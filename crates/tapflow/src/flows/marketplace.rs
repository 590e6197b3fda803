//! Marketplace: list a business or discover nearby ones.
//!
//! Listing: category → `await_business_name` → `await_business_desc` →
//! `await_business_location` → `await_business_catalog` → business created.
//! Discovery: category → `await_market_see_loc` → ranked businesses.

use tapflow_protocol::{Button, ListMessage, ListRow};
use tracing::info;
use url::Url;

use super::home::back_home_button;
use super::{Flow, FlowContext, FlowError, FlowResult, Outcome};
use crate::matching::{MatchKind, MatchQuery};
use crate::router::Route;
use crate::share::ShareLinks;
use crate::state::{BusinessCategory, FlowState, LocatedBusiness};
use crate::store::{Business, ContactStore, GeoPoint, MarketplaceStore, NewBusiness};

pub const LIST_ROUTES: &[Route] = &[
    Route::exact("marketplace", Flow::Marketplace),
    Route::prefix("cat_", Flow::Marketplace),
    Route::prefix("see_cat_", Flow::Marketplace),
    Route::prefix("biz_", Flow::Marketplace),
];

pub const BUTTON_ROUTES: &[Route] = &[
    Route::exact("mk_add", Flow::Marketplace),
    Route::exact("mk_see", Flow::Marketplace),
    Route::exact("biz_catalog_skip", Flow::Marketplace),
    Route::prefix("biz_contact_", Flow::Marketplace),
    Route::prefix("biz_catalog_", Flow::Marketplace),
];

const CATEGORIES: &[(&str, &str)] = &[
    ("pharmacy", "Pharmacy"),
    ("restaurant", "Restaurant"),
    ("salon", "Salon"),
    ("hardware", "Hardware"),
    ("grocery", "Grocery"),
    ("garage", "Garage"),
    ("other", "Other"),
];

fn category_label(slug: &str) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, label)| *label)
}

pub async fn on_list(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    if id == "marketplace" {
        ctx.set_state(FlowState::MarketMenu).await?;
        ctx.reply_buttons(
            "Marketplace: add your business or find one nearby.",
            vec![
                Button::new("mk_add", "Add business"),
                Button::new("mk_see", "See businesses"),
            ],
        )
        .await?;
        return Ok(Outcome::Handled);
    }
    if let Some(slug) = id.strip_prefix("see_cat_") {
        let Some(label) = category_label(slug) else {
            return Ok(Outcome::Declined);
        };
        ctx.set_state(FlowState::AwaitMarketSeeLoc(BusinessCategory::new(slug)))
            .await?;
        ctx.reply_text(format!(
            "Share your location to see nearby {} businesses.",
            label.to_lowercase()
        ))
        .await?;
        return Ok(Outcome::Handled);
    }
    if let Some(slug) = id.strip_prefix("cat_") {
        if category_label(slug).is_none() {
            return Ok(Outcome::Declined);
        }
        ctx.set_state(FlowState::AwaitBusinessName(BusinessCategory::new(slug)))
            .await?;
        ctx.reply_text("What is the business name?").await?;
        return Ok(Outcome::Handled);
    }
    if let Some(business_id) = id.strip_prefix("biz_") {
        if let Some(business) = fetch(ctx, business_id).await? {
            show_business(ctx, &business).await?;
        }
        return Ok(Outcome::Handled);
    }
    Ok(Outcome::Declined)
}

pub async fn on_button(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    match id {
        "mk_add" => send_categories(ctx, "cat_", "Pick your business category.").await?,
        "mk_see" => send_categories(ctx, "see_cat_", "What are you looking for?").await?,
        "biz_catalog_skip" => {
            let FlowState::AwaitBusinessCatalog(located) = ctx.state.clone() else {
                return Ok(Outcome::Declined);
            };
            create(ctx, located, None).await?;
        }
        _ => {
            if let Some(business_id) = id.strip_prefix("biz_contact_") {
                let Some(business) = fetch(ctx, business_id).await? else {
                    return Ok(Outcome::Handled);
                };
                let owner = ctx.store().get_contact(&business.owner_id).await?;
                match owner.filter(|o| !o.opted_out) {
                    Some(owner) => {
                        let prefill = format!("Hi, I found {} on the marketplace.", business.name);
                        let link = ShareLinks::chat_link(&owner.phone, Some(&prefill));
                        ctx.reply_text(format!("Chat with {}:\n{link}", business.name))
                            .await?;
                    }
                    None => ctx.reply_text("Business contact unavailable.").await?,
                }
            } else if let Some(business_id) = id.strip_prefix("biz_catalog_") {
                let Some(business) = fetch(ctx, business_id).await? else {
                    return Ok(Outcome::Handled);
                };
                match &business.catalog_url {
                    Some(url) => {
                        ctx.reply_text(format!("{} catalog:\n{url}", business.name))
                            .await?
                    }
                    None => ctx.reply_text("No catalog for this business.").await?,
                }
            } else {
                return Ok(Outcome::Declined);
            }
        }
    }
    Ok(Outcome::Handled)
}

/// Claims text only while a listing is being collected.
pub async fn on_text(ctx: &mut FlowContext<'_>, text: &str) -> FlowResult {
    let text = text.trim();
    match ctx.state.clone() {
        FlowState::AwaitBusinessName(category) => {
            if text.is_empty() {
                ctx.reply_text("Name cannot be empty.").await?;
            } else {
                ctx.set_state(FlowState::AwaitBusinessDesc(category.named(text)))
                    .await?;
                ctx.reply_text("Describe the business, or reply SKIP.")
                    .await?;
            }
        }
        FlowState::AwaitBusinessDesc(named) => {
            let description =
                (!text.is_empty() && !text.eq_ignore_ascii_case("skip")).then(|| text.to_string());
            ctx.set_state(FlowState::AwaitBusinessLocation(named.describe(description)))
                .await?;
            ctx.reply_text("Share the business location (📎 → Location).")
                .await?;
        }
        FlowState::AwaitBusinessCatalog(located) => {
            if text.eq_ignore_ascii_case("skip") {
                create(ctx, located, None).await?;
            } else if let Some(url) = catalog_url(text) {
                create(ctx, located, Some(url)).await?;
            } else {
                ctx.reply_buttons(
                    "Send a link starting with http:// or https://, or tap Skip.",
                    vec![Button::new("biz_catalog_skip", "Skip")],
                )
                .await?;
            }
        }
        _ => return Ok(Outcome::Declined),
    }
    Ok(Outcome::Handled)
}

pub async fn on_location(ctx: &mut FlowContext<'_>, point: GeoPoint) -> FlowResult {
    match ctx.state.clone() {
        FlowState::AwaitBusinessLocation(described) => {
            ctx.set_state(FlowState::AwaitBusinessCatalog(described.located(point)))
                .await?;
            ctx.reply_buttons(
                "Send a link to your catalog or menu, or skip.",
                vec![Button::new("biz_catalog_skip", "Skip")],
            )
            .await?;
        }
        FlowState::AwaitMarketSeeLoc(category) => {
            ctx.clear_state().await?;
            let query = MatchQuery::new(MatchKind::Businesses, point, ctx.user_id())
                .with_filter(category.category.clone());
            let rows = ctx.services.matching.nearby(&query).await;
            if rows.is_empty() {
                ctx.reply_buttons(
                    "No businesses found nearby.",
                    vec![back_home_button()],
                )
                .await?;
            } else {
                let rows = rows
                    .iter()
                    .map(|r| ListRow::new(format!("biz_{}", r.id), &r.title).with_description(&r.describe()))
                    .collect();
                ctx.reply_list(ListMessage::new(
                    "Businesses",
                    "Nearest first.",
                    "View",
                    "Nearby",
                    rows,
                ))
                .await?;
            }
        }
        _ => return Ok(Outcome::Declined),
    }
    Ok(Outcome::Handled)
}

async fn send_categories(ctx: &FlowContext<'_>, prefix: &str, body: &str) -> Result<(), FlowError> {
    let rows = CATEGORIES
        .iter()
        .map(|(slug, label)| ListRow::new(format!("{prefix}{slug}"), label))
        .collect();
    ctx.reply_list(ListMessage::new("Categories", body, "Choose", "Categories", rows))
        .await
}

async fn show_business(ctx: &FlowContext<'_>, business: &Business) -> Result<(), FlowError> {
    let mut body = business.name.clone();
    if let Some(description) = &business.description {
        body.push('\n');
        body.push_str(description);
    }
    let mut buttons = vec![Button::new(format!("biz_contact_{}", business.id), "Contact")];
    if business.catalog_url.is_some() {
        buttons.push(Button::new(format!("biz_catalog_{}", business.id), "Catalog"));
    }
    buttons.push(back_home_button());
    ctx.reply_buttons(body, buttons).await
}

async fn create(
    ctx: &mut FlowContext<'_>,
    located: LocatedBusiness,
    catalog_url: Option<String>,
) -> Result<(), FlowError> {
    let described = located.described;
    let named = described.named;
    let business = ctx
        .store()
        .create_business(NewBusiness {
            owner_id: ctx.user_id().to_string(),
            category: named.category.category,
            name: named.name,
            description: described.description,
            location: located.location,
            catalog_url,
        })
        .await?;
    ctx.clear_state().await?;
    info!(business_id = %business.id, user_id = ctx.user_id(), "Business listed");
    ctx.reply_buttons(
        format!("✅ {} is now listed in the marketplace.", business.name),
        vec![back_home_button()],
    )
    .await
}

fn catalog_url(text: &str) -> Option<String> {
    let url = Url::parse(text).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

async fn fetch(ctx: &FlowContext<'_>, business_id: &str) -> Result<Option<Business>, FlowError> {
    let business = ctx.store().get_business(business_id).await?;
    if business.is_none() {
        ctx.reply_text("Business not found.").await?;
    }
    Ok(business)
}
