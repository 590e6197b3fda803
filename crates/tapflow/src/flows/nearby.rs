//! Nearby drivers and passengers.

use tapflow_protocol::{ListMessage, ListRow};

use super::home::back_home_button;
use super::{Flow, FlowContext, FlowError, FlowResult, Outcome};
use crate::matching::{MatchKind, MatchQuery};
use crate::router::Route;
use crate::share::ShareLinks;
use crate::state::{FlowState, VehicleFilter};
use crate::store::{ContactStore, GeoPoint};

pub const LIST_ROUTES: &[Route] = &[
    Route::exact("see_drivers", Flow::Nearby),
    Route::exact("see_passengers", Flow::Nearby),
    Route::prefix("near_v_drv_", Flow::Nearby),
    Route::prefix("near_v_pax_", Flow::Nearby),
    Route::prefix("drv_", Flow::Nearby),
    Route::prefix("pax_", Flow::Nearby),
];

pub(crate) const VEHICLES: &[(&str, &str)] = &[
    ("moto", "Moto"),
    ("cab", "Cab"),
    ("lifan", "Lifan"),
    ("truck", "Truck"),
];

pub(crate) fn vehicle_label(vehicle: &str) -> Option<&'static str> {
    VEHICLES
        .iter()
        .find(|(v, _)| *v == vehicle)
        .map(|(_, label)| *label)
}

pub(crate) fn vehicle_rows(prefix: &str) -> Vec<ListRow> {
    VEHICLES
        .iter()
        .map(|(v, label)| ListRow::new(format!("{prefix}{v}"), label))
        .collect()
}

#[derive(Clone, Copy)]
enum Side {
    Drivers,
    Passengers,
}

impl Side {
    fn noun(self) -> &'static str {
        match self {
            Side::Drivers => "driver",
            Side::Passengers => "passenger",
        }
    }

    fn row_prefix(self) -> &'static str {
        match self {
            Side::Drivers => "drv_",
            Side::Passengers => "pax_",
        }
    }
}

pub async fn on_list(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    match id {
        "see_drivers" => {
            ctx.reply_list(ListMessage::new(
                "Nearby drivers",
                "Which vehicle do you need?",
                "Choose",
                "Vehicles",
                vehicle_rows("near_v_drv_"),
            ))
            .await?;
        }
        "see_passengers" => {
            ctx.reply_list(ListMessage::new(
                "Nearby passengers",
                "Which vehicle do you drive?",
                "Choose",
                "Vehicles",
                vehicle_rows("near_v_pax_"),
            ))
            .await?;
        }
        _ => {
            if let Some(vehicle) = id.strip_prefix("near_v_drv_") {
                return await_location(ctx, Side::Drivers, vehicle).await;
            }
            if let Some(vehicle) = id.strip_prefix("near_v_pax_") {
                return await_location(ctx, Side::Passengers, vehicle).await;
            }
            if let Some(user_id) = id.strip_prefix("drv_") {
                connect(ctx, Side::Drivers, user_id).await?;
            } else if let Some(user_id) = id.strip_prefix("pax_") {
                connect(ctx, Side::Passengers, user_id).await?;
            } else {
                return Ok(Outcome::Declined);
            }
        }
    }
    Ok(Outcome::Handled)
}

pub async fn on_location(ctx: &mut FlowContext<'_>, point: GeoPoint) -> FlowResult {
    let (side, filter) = match ctx.state.clone() {
        FlowState::NearAwaitLocDrivers(filter) => (Side::Drivers, filter),
        FlowState::NearAwaitLocPassengers(filter) => (Side::Passengers, filter),
        _ => return Ok(Outcome::Declined),
    };
    ctx.clear_state().await?;

    let kind = match side {
        Side::Drivers => MatchKind::Drivers,
        Side::Passengers => MatchKind::Passengers,
    };
    let query = MatchQuery::new(kind, point, ctx.user_id()).with_filter(filter.vehicle);
    let rows = ctx.services.matching.nearby(&query).await;
    if rows.is_empty() {
        ctx.reply_buttons(
            format!("No {}s found nearby. Try again later.", side.noun()),
            vec![back_home_button()],
        )
        .await?;
        return Ok(Outcome::Handled);
    }

    let rows = rows
        .iter()
        .map(|r| {
            ListRow::new(format!("{}{}", side.row_prefix(), r.id), &r.title)
                .with_description(&r.describe())
        })
        .collect();
    ctx.reply_list(ListMessage::new(
        "Nearby",
        &format!("Nearby {}s, nearest first.", side.noun()),
        "View",
        "Results",
        rows,
    ))
    .await?;
    Ok(Outcome::Handled)
}

async fn await_location(ctx: &mut FlowContext<'_>, side: Side, vehicle: &str) -> FlowResult {
    let Some(label) = vehicle_label(vehicle) else {
        return Ok(Outcome::Declined);
    };
    let filter = VehicleFilter {
        vehicle: vehicle.to_string(),
    };
    let state = match side {
        Side::Drivers => FlowState::NearAwaitLocDrivers(filter),
        Side::Passengers => FlowState::NearAwaitLocPassengers(filter),
    };
    ctx.set_state(state).await?;
    ctx.reply_text(format!(
        "Share your location to find nearby {} {}s (📎 → Location).",
        label.to_lowercase(),
        side.noun()
    ))
    .await?;
    Ok(Outcome::Handled)
}

/// Hand over a chat link after checking the counterparty still exists.
async fn connect(ctx: &FlowContext<'_>, side: Side, user_id: &str) -> Result<(), FlowError> {
    let contact = ctx.store().get_contact(user_id).await?;
    let Some(contact) = contact.filter(|c| !c.opted_out) else {
        return ctx
            .reply_buttons(
                format!("That {} is no longer available.", side.noun()),
                vec![back_home_button()],
            )
            .await;
    };
    let prefill = format!("Hi, I found you on the nearby {}s list.", side.noun());
    let link = ShareLinks::chat_link(&contact.phone, Some(&prefill));
    ctx.reply_buttons(
        format!("Chat with this {}:\n{link}", side.noun()),
        vec![back_home_button()],
    )
    .await
}

#[cfg(test)]
mod tests {
    use tapflow_protocol::OutboundMessage;

    use super::*;
    use crate::extraction::StaticDocumentExtractor;
    use crate::flows::testing::Harness;
    use crate::matching::{MatchRow, StaticMatchingEngine};

    const RIDER: &str = "250788000001";
    const DRIVER: &str = "250788000002";

    fn here() -> GeoPoint {
        GeoPoint {
            latitude: -1.95,
            longitude: 30.06,
        }
    }

    #[tokio::test]
    async fn vehicle_choice_waits_for_location() {
        let harness = Harness::new();
        let mut ctx = harness.ctx(RIDER).await;
        on_list(&mut ctx, "see_drivers").await.unwrap();
        on_list(&mut ctx, "near_v_drv_moto").await.unwrap();
        assert_eq!(
            harness.state_of(RIDER).await,
            FlowState::NearAwaitLocDrivers(VehicleFilter {
                vehicle: "moto".into()
            })
        );
        assert_eq!(
            on_list(&mut ctx, "near_v_drv_rocket").await.unwrap(),
            Outcome::Declined
        );
    }

    #[tokio::test]
    async fn location_lists_nearby_drivers() {
        let engine = StaticMatchingEngine::new().with_rows(
            MatchKind::Drivers,
            vec![MatchRow {
                id: "u-eric".into(),
                title: "Eric".into(),
                distance_km: Some(1.2),
                phone: None,
            }],
        );
        let harness = Harness::with(engine, StaticDocumentExtractor::disabled());
        let mut ctx = harness
            .ctx_in(
                RIDER,
                FlowState::NearAwaitLocDrivers(VehicleFilter {
                    vehicle: "moto".into(),
                }),
            )
            .await;
        on_location(&mut ctx, here()).await.unwrap();
        assert_eq!(harness.state_of(RIDER).await, FlowState::Home);

        let sent = harness.messenger.sent_to(RIDER).await;
        let OutboundMessage::List(list) = &sent[0] else {
            panic!("expected list, got {:?}", sent[0]);
        };
        assert_eq!(list.rows[0].id, "drv_u-eric");
        assert_eq!(list.rows[0].description.as_deref(), Some("1.2 km away"));
    }

    #[tokio::test]
    async fn selection_revalidates_counterparty() {
        let harness = Harness::new();
        let driver = harness.ctx(DRIVER).await;
        let mut ctx = harness.ctx(RIDER).await;

        on_list(&mut ctx, &format!("drv_{}", driver.user_id()))
            .await
            .unwrap();
        harness
            .services
            .store
            .set_opted_out(driver.user_id(), true)
            .await
            .unwrap();
        on_list(&mut ctx, &format!("drv_{}", driver.user_id()))
            .await
            .unwrap();
        on_list(&mut ctx, "pax_ghost").await.unwrap();

        let bodies: Vec<String> = harness
            .messenger
            .sent_to(RIDER)
            .await
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Buttons { body, .. } => Some(body),
                _ => None,
            })
            .collect();
        assert!(bodies[0].contains("https://wa.me/250788000002?text="));
        assert_eq!(bodies[1], "That driver is no longer available.");
        assert_eq!(bodies[2], "That passenger is no longer available.");
    }

    #[tokio::test]
    async fn empty_results_say_so() {
        let harness = Harness::new();
        let mut ctx = harness
            .ctx_in(
                RIDER,
                FlowState::NearAwaitLocPassengers(VehicleFilter {
                    vehicle: "cab".into(),
                }),
            )
            .await;
        on_location(&mut ctx, here()).await.unwrap();
        let sent = harness.messenger.sent_to(RIDER).await;
        assert!(matches!(&sent[0], OutboundMessage::Buttons { body, .. }
            if body == "No passengers found nearby. Try again later."));
    }
}
