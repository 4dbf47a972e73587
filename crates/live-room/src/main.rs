//! Live Room simulator
//!
//! Runs an owner session and an audience session side by side against an
//! in-memory coordinator, relaying each command to the other session the way
//! the coordination service would, and logs every snapshot.
//!
//! # Flow
//!
//! 1. Load configuration from environment
//! 2. Join the room as owner (`100`) and as audience (`200`)
//! 3. Owner invites `200`, audience accepts: multi mode
//! 4. Owner force-ends once with a scripted failure (rolled back), then for real
//! 5. Both sessions leave

#![warn(clippy::pedantic)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use live_room::actors::RemoteNotification;
use live_room::config::Config;
use live_room::coordination::{CallKind, Extras, InMemoryCoordinator};
use live_room::errors::CoordinationError;
use live_room::participant::{Participant, StaticDirectory};
use live_room::session::{RoomSession, SessionContext};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ROOM_ID: &str = "sim-room";

/// Latency of every coordination call.
const COORDINATION_LATENCY: Duration = Duration::from_millis(150);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_room=debug,live_room_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    info!(seat_count = config.seat_count, "Starting Live Room simulator");

    let host = Participant::new("100", "Host", 1, false);
    let guest = Participant::new("200", "Guest", 2, false);
    let directory = Arc::new(StaticDirectory::new([guest.clone()]));
    let coordinator =
        Arc::new(InMemoryCoordinator::new().with_latency(COORDINATION_LATENCY));

    let owner = RoomSession::join(
        SessionContext::builder()
            .room_id(ROOM_ID)
            .local(host.clone())
            .owner(host.clone())
            .build()?,
        &config,
        Arc::clone(&coordinator),
        directory.clone(),
    );
    let audience = RoomSession::join(
        SessionContext::builder()
            .room_id(ROOM_ID)
            .local(guest.clone())
            .owner(host.clone())
            .build()?,
        &config,
        Arc::clone(&coordinator),
        directory,
    );

    // Invite and accept.
    owner.invite(&guest.user_id).await?;
    log_snapshot("owner invited", &owner)?;

    audience
        .apply_notification(RemoteNotification::InvitationReceived {
            seat_index: 1,
            owner_id: host.user_id.clone(),
            invitee: guest.clone(),
        })
        .await?;
    audience.handle().get_snapshot().await?;

    let mut extras = Extras::new();
    extras.insert("virtualAvatar".to_string(), serde_json::json!("none"));
    audience.accept_invitation(extras).await?;
    log_snapshot("audience accepted", &audience)?;

    owner
        .apply_notification(RemoteNotification::InvitationAccepted {
            seat_index: 1,
            broadcaster: guest.clone(),
        })
        .await?;
    owner.handle().get_snapshot().await?;
    log_snapshot("owner sees co-broadcaster", &owner)?;

    // A force-end the coordinator refuses is rolled back.
    coordinator
        .push_outcome(
            CallKind::ForceEnd,
            Err(CoordinationError::Rejected("simulated refusal".to_string())),
        )
        .await;
    match owner.force_end_broadcasting().await {
        Ok(()) => warn!("Scripted force-end failure did not happen"),
        Err(e) => info!(error = %e, code = e.error_code(), "Force-end refused"),
    }
    log_snapshot("owner after refused force-end", &owner)?;

    owner.force_end_broadcasting().await?;
    audience
        .apply_notification(RemoteNotification::BroadcastingEnded {
            seat_index: 1,
            user_id: guest.user_id.clone(),
            forced: true,
        })
        .await?;
    audience.handle().get_snapshot().await?;
    log_snapshot("owner after force-end", &owner)?;
    log_snapshot("audience after force-end", &audience)?;

    info!(calls = coordinator.call_count(), "Coordination calls issued");

    audience.leave().await?;
    owner.leave().await?;
    info!("Live Room simulator finished");
    Ok(())
}

fn log_snapshot(step: &str, session: &RoomSession) -> anyhow::Result<()> {
    let snapshot = session.snapshot();
    info!(
        step,
        local = %session.context().local().user_id,
        mode = snapshot.mode.as_str(),
        control = ?session.broadcast_control(),
        snapshot = %serde_json::to_string(&snapshot)?,
        "Snapshot"
    );
    Ok(())
}
