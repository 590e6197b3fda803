//! Motor insurance document intake.
//!
//! The user is asked for a photo or PDF; the attachment becomes a lead, the
//! extractor is tried once, staff are notified and the user always gets the
//! same acknowledgment whatever the extractor returned.

use futures::future::join_all;
use serde_json::Value;
use tapflow_protocol::{MediaPayload, OutboundMessage};
use tracing::{info, warn};

use super::{Flow, FlowContext, FlowResult, Outcome, local_number};
use crate::extraction::ExtractedFields;
use crate::router::Route;
use crate::state::FlowState;
use crate::store::{IntakeStore, NewInsuranceLead};

pub const LIST_ROUTES: &[Route] = &[Route::exact("motor_insurance", Flow::Insurance)];

const ASK_FOR_DOCUMENT: &str =
    "Send a photo or PDF of your vehicle's yellow card or current insurance certificate.";
const ACKNOWLEDGED: &str =
    "Thanks! We received your document. Our team will get back to you with a quote shortly.";

pub async fn on_list(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    if id != "motor_insurance" {
        return Ok(Outcome::Declined);
    }
    ctx.set_state(FlowState::InsWaitDoc).await?;
    ctx.reply_text(ASK_FOR_DOCUMENT).await?;
    Ok(Outcome::Handled)
}

pub async fn on_media(ctx: &mut FlowContext<'_>, media: &MediaPayload) -> FlowResult {
    if ctx.state != FlowState::InsWaitDoc {
        return Ok(Outcome::Declined);
    }

    let file_url = match ctx.services.messenger.media_url(&media.media_id).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(media_id = %media.media_id, error = %e, "Media URL lookup failed");
            None
        }
    };
    let lead = ctx
        .store()
        .create_lead(NewInsuranceLead {
            user_id: ctx.user_id().to_string(),
            media_id: media.media_id.clone(),
            mime_type: media.mime_type.clone(),
            file_url: file_url.clone(),
        })
        .await?;
    ctx.clear_state().await?;
    info!(lead_id = %lead.id, user_id = ctx.user_id(), kind = media.kind.as_str(), "Insurance lead created");

    let extracted = match &file_url {
        Some(url) => ctx.services.extractor.extract(url).await,
        None => None,
    };
    if let Some(fields) = &extracted {
        let value = Value::Object(fields.clone());
        if let Err(e) = ctx.store().attach_extraction(&lead.id, &value).await {
            warn!(lead_id = %lead.id, error = %e, "Storing extraction failed");
        }
    }

    let admins = match ctx.services.admin_numbers().await {
        Ok(admins) => admins,
        Err(e) => {
            warn!(error = %e, "Admin number lookup failed");
            Vec::new()
        }
    };
    let notice = staff_notice(&local_number(ctx.phone()), &lead.id, extracted.as_ref());
    let sends = admins
        .iter()
        .map(|admin| ctx.notify_phone(admin, OutboundMessage::text(notice.clone())));
    let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();
    info!(lead_id = %lead.id, admins = admins.len(), delivered, "Staff notified");

    ctx.reply_text(ACKNOWLEDGED).await?;
    Ok(Outcome::Handled)
}

/// Re-prompt while a document is expected.
pub async fn on_text(ctx: &mut FlowContext<'_>, _text: &str) -> FlowResult {
    if ctx.state != FlowState::InsWaitDoc {
        return Ok(Outcome::Declined);
    }
    ctx.reply_text(format!("Please send the document itself. {ASK_FOR_DOCUMENT}"))
        .await?;
    Ok(Outcome::Handled)
}

fn staff_notice(from: &str, lead_id: &str, extracted: Option<&ExtractedFields>) -> String {
    let mut notice = format!("New motor insurance lead from {from}\nLead: {lead_id}");
    match extracted.filter(|fields| !fields.is_empty()) {
        Some(fields) => {
            for (key, value) in fields {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                notice.push_str(&format!("\n{key}: {value}"));
            }
        }
        None => notice.push_str("\nNo details extracted."),
    }
    notice
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tapflow_protocol::MediaKind;

    use super::*;
    use crate::extraction::StaticDocumentExtractor;
    use crate::flows::testing::Harness;
    use crate::matching::StaticMatchingEngine;

    const PHONE: &str = "250788000001";
    const ADMIN: &str = "250788999999";

    fn document() -> MediaPayload {
        MediaPayload {
            kind: MediaKind::Document,
            media_id: "m-123".into(),
            mime_type: Some("application/pdf".into()),
            caption: None,
            filename: Some("card.pdf".into()),
        }
    }

    #[tokio::test]
    async fn document_becomes_lead_and_notifies_staff() {
        let fields = json!({ "plate": "RAD 123 A", "insurer": "Radiant" });
        let harness = Harness::with(
            StaticMatchingEngine::new(),
            StaticDocumentExtractor::returning(fields.as_object().unwrap().clone()),
        );
        harness.store.set_admin_numbers(vec![ADMIN.into()]).await;

        let mut ctx = harness.ctx(PHONE).await;
        on_list(&mut ctx, "motor_insurance").await.unwrap();
        assert_eq!(on_media(&mut ctx, &document()).await.unwrap(), Outcome::Handled);

        let leads = harness.store.leads().await;
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].file_url.as_deref(), Some("https://media.invalid/m-123"));
        assert_eq!(leads[0].extracted.as_ref().unwrap()["plate"], "RAD 123 A");
        assert_eq!(harness.state_of(PHONE).await, FlowState::Home);

        let staff = harness.messenger.texts_to(ADMIN).await;
        assert_eq!(staff.len(), 1);
        assert!(staff[0].contains("from 0788000001"));
        assert!(staff[0].contains("plate: RAD 123 A"));
        assert_eq!(
            harness.messenger.texts_to(PHONE).await.last().unwrap(),
            ACKNOWLEDGED
        );
    }

    #[tokio::test]
    async fn failed_extraction_still_acknowledges() {
        let harness = Harness::new();
        let mut ctx = harness.ctx_in(PHONE, FlowState::InsWaitDoc).await;
        on_media(&mut ctx, &document()).await.unwrap();

        assert!(harness.store.leads().await[0].extracted.is_none());
        assert_eq!(harness.messenger.texts_to(PHONE).await, vec![ACKNOWLEDGED]);
    }

    #[tokio::test]
    async fn text_while_waiting_reprompts() {
        let harness = Harness::new();
        let mut ctx = harness.ctx_in(PHONE, FlowState::InsWaitDoc).await;
        on_text(&mut ctx, "here it is").await.unwrap();
        assert_eq!(harness.state_of(PHONE).await, FlowState::InsWaitDoc);

        let mut other = harness.ctx("250788000002").await;
        assert_eq!(on_text(&mut other, "hello").await.unwrap(), Outcome::Declined);
        assert_eq!(on_media(&mut other, &document()).await.unwrap(), Outcome::Declined);
    }

    #[test]
    fn notice_without_fields() {
        assert_eq!(
            staff_notice("0788000001", "lead1", None),
            "New motor insurance lead from 0788000001\nLead: lead1\nNo details extracted."
        );
    }
}
