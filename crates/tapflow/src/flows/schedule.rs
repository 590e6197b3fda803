//! Trip scheduling.
//!
//! `await_schedule_role` → `await_schedule_vehicle` → `await_schedule_pickup`
//! → trip created → optional `sched_await_drop` → matching trips of the
//! opposite role.

use tapflow_protocol::{Button, ListMessage, ListRow};
use tracing::info;

use super::home::back_home_button;
use super::nearby::{vehicle_label, vehicle_rows};
use super::{Flow, FlowContext, FlowError, FlowResult, Outcome};
use crate::matching::{MatchKind, MatchQuery};
use crate::router::Route;
use crate::share::ShareLinks;
use crate::state::{FlowState, ScheduleRole, TripRef};
use crate::store::{ContactStore, GeoPoint, NewTrip, Trip, TripRole, TripStatus, TripStore};

pub const LIST_ROUTES: &[Route] = &[
    Route::exact("schedule_trip", Flow::Schedule),
    Route::prefix("veh_", Flow::Schedule),
    Route::prefix("mtch_", Flow::Schedule),
    Route::gated("role_driver", "await_schedule_role", Flow::Schedule),
    Route::gated("role_passenger", "await_schedule_role", Flow::Schedule),
];

pub const BUTTON_ROUTES: &[Route] = &[
    Route::prefix("sched_add_drop_", Flow::Schedule),
    Route::prefix("sched_skip_drop_", Flow::Schedule),
];

pub async fn on_list(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    match id {
        "schedule_trip" => {
            ctx.set_state(FlowState::AwaitScheduleRole).await?;
            ctx.reply_list(ListMessage::new(
                "Schedule trip",
                "Are you driving or riding?",
                "Choose",
                "Role",
                vec![
                    ListRow::new("role_driver", "Driver").with_description("I'm offering rides"),
                    ListRow::new("role_passenger", "Passenger").with_description("I need a ride"),
                ],
            ))
            .await?;
        }
        "role_driver" | "role_passenger" => {
            if ctx.state != FlowState::AwaitScheduleRole {
                return Ok(Outcome::Declined);
            }
            let role = if id == "role_driver" {
                TripRole::Driver
            } else {
                TripRole::Passenger
            };
            ctx.set_state(FlowState::AwaitScheduleVehicle(ScheduleRole { role }))
                .await?;
            ctx.reply_list(ListMessage::new(
                "Vehicle",
                "Which vehicle?",
                "Choose",
                "Vehicles",
                vehicle_rows("veh_"),
            ))
            .await?;
        }
        _ => {
            if let Some(vehicle) = id.strip_prefix("veh_") {
                let FlowState::AwaitScheduleVehicle(role) = ctx.state.clone() else {
                    return Ok(Outcome::Declined);
                };
                if vehicle_label(vehicle).is_none() {
                    return Ok(Outcome::Declined);
                }
                ctx.set_state(FlowState::AwaitSchedulePickup(role.with_vehicle(vehicle)))
                    .await?;
                ctx.reply_text("Share your pickup location (📎 → Location).")
                    .await?;
            } else if let Some(trip_id) = id.strip_prefix("mtch_") {
                connect(ctx, trip_id).await?;
            } else {
                return Ok(Outcome::Declined);
            }
        }
    }
    Ok(Outcome::Handled)
}

pub async fn on_button(ctx: &mut FlowContext<'_>, id: &str) -> FlowResult {
    if let Some(trip_id) = id.strip_prefix("sched_add_drop_") {
        if let Some(trip) = own_trip(ctx, trip_id).await? {
            ctx.set_state(FlowState::SchedAwaitDrop(TripRef { trip_id: trip.id }))
                .await?;
            ctx.reply_text("Share your drop-off location (📎 → Location).")
                .await?;
        }
        return Ok(Outcome::Handled);
    }
    if let Some(trip_id) = id.strip_prefix("sched_skip_drop_") {
        if let Some(trip) = own_trip(ctx, trip_id).await? {
            ctx.clear_state().await?;
            show_matches(ctx, &trip).await?;
        }
        return Ok(Outcome::Handled);
    }
    Ok(Outcome::Declined)
}

pub async fn on_location(ctx: &mut FlowContext<'_>, point: GeoPoint) -> FlowResult {
    match ctx.state.clone() {
        FlowState::AwaitSchedulePickup(plan) => {
            let trip = ctx
                .store()
                .create_trip(NewTrip {
                    creator_id: ctx.user_id().to_string(),
                    role: plan.role.role,
                    vehicle: plan.vehicle,
                    pickup: point,
                })
                .await?;
            ctx.clear_state().await?;
            info!(trip_id = %trip.id, user_id = ctx.user_id(), role = %trip.role, "Trip scheduled");
            ctx.reply_buttons(
                "Trip scheduled. Add a drop-off location?",
                vec![
                    Button::new(format!("sched_add_drop_{}", trip.id), "Add drop-off"),
                    Button::new(format!("sched_skip_drop_{}", trip.id), "Skip"),
                ],
            )
            .await?;
        }
        FlowState::SchedAwaitDrop(trip_ref) => {
            ctx.clear_state().await?;
            if let Some(trip) = own_trip(ctx, &trip_ref.trip_id).await? {
                ctx.store().set_trip_dropoff(&trip.id, point).await?;
                ctx.reply_text("Drop-off saved.").await?;
                show_matches(ctx, &trip).await?;
            }
        }
        _ => return Ok(Outcome::Declined),
    }
    Ok(Outcome::Handled)
}

async fn show_matches(ctx: &FlowContext<'_>, trip: &Trip) -> Result<(), FlowError> {
    let query = MatchQuery::new(MatchKind::Trips, trip.pickup, ctx.user_id())
        .with_filter(trip.role.opposite().as_str());
    let rows = ctx.services.matching.nearby(&query).await;
    if rows.is_empty() {
        return ctx
            .reply_buttons(
                "No matching trips yet. Your trip stays open.",
                vec![back_home_button()],
            )
            .await;
    }
    let rows = rows
        .iter()
        .map(|r| ListRow::new(format!("mtch_{}", r.id), &r.title).with_description(&r.describe()))
        .collect();
    ctx.reply_list(ListMessage::new(
        "Matching trips",
        &format!("{}s heading your way.", capitalize(trip.role.opposite().as_str())),
        "View",
        "Trips",
        rows,
    ))
    .await
}

/// Re-read a matched trip and hand over its creator's chat link if still open.
async fn connect(ctx: &FlowContext<'_>, trip_id: &str) -> Result<(), FlowError> {
    let trip = ctx
        .store()
        .get_trip(trip_id)
        .await?
        .filter(|t| t.status == TripStatus::Open);
    let creator = match &trip {
        Some(trip) => ctx
            .store()
            .get_contact(&trip.creator_id)
            .await?
            .filter(|c| !c.opted_out),
        None => None,
    };
    let Some(creator) = creator else {
        return ctx
            .reply_buttons("That trip is no longer available.", vec![back_home_button()])
            .await;
    };
    let link = ShareLinks::chat_link(&creator.phone, Some("Hi, I saw your trip."));
    ctx.reply_buttons(
        format!("Chat about this trip:\n{link}"),
        vec![back_home_button()],
    )
    .await
}

/// The caller's own trip, or a not-found reply.
async fn own_trip(ctx: &FlowContext<'_>, trip_id: &str) -> Result<Option<Trip>, FlowError> {
    let trip = ctx
        .store()
        .get_trip(trip_id)
        .await?
        .filter(|t| t.creator_id == ctx.user_id());
    if trip.is_none() {
        ctx.reply_text("Trip not found.").await?;
    }
    Ok(trip)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
