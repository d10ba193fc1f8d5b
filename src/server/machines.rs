//! Machine registry: device registration, the per-user cap, and hardware
//! drift updates.

use tracing::{info, warn};

use crate::errors::{WardenError, WardenResult};
use crate::server::database::{Database, Machine, NewMachine};

/// Outcome of resolving a heartbeat's machine fingerprint.
#[derive(Debug, Clone)]
pub enum Registration {
    /// Fingerprint was unknown; a row was created.
    New(Machine),
    /// Fingerprint already registered; the stored row, untouched.
    Existing(Machine),
    /// Fingerprint was unknown and the user is at the cap; nothing created.
    LimitExceeded,
}

/// Look up the machine for (api_key, machine_id); register it if absent.
///
/// The cap only gates creation: an already-registered machine always
/// resolves, regardless of how many rows the user has. The count-then-insert
/// window is not serialized; the UNIQUE (api_key, machine_id) constraint
/// keeps fingerprints from duplicating, but two concurrent first-contact
/// heartbeats from distinct machines can momentarily overshoot the cap.
pub async fn verify_or_register(
    db: &Database,
    api_key: &str,
    machine_id: &str,
    name: &str,
    ram: i64,
    cores: i64,
    max_machines: u32,
) -> WardenResult<Registration> {
    if let Some(machine) = db.find_machine(api_key, machine_id).await? {
        return Ok(Registration::Existing(machine));
    }

    let count = db.count_machines(api_key).await?;
    if count >= i64::from(max_machines) {
        warn!(
            machine_count = count,
            "Machine registration rejected: per-user cap reached"
        );
        return Ok(Registration::LimitExceeded);
    }

    let machine = db
        .create_machine(NewMachine {
            machine_id: machine_id.to_string(),
            api_key: api_key.to_string(),
            name: name.to_string(),
            ram,
            cores,
        })
        .await?;

    info!(machine_id = %machine.machine_id, "Registered new machine");

    Ok(Registration::New(machine))
}

/// Compare stored hardware against reported values and persist any drift.
///
/// Only the fields that changed are written (plus `updated_at`); when both
/// match, this is a no-op. Drift is recorded silently and never fails the
/// heartbeat.
pub async fn verify_and_update_hardware(
    db: &Database,
    machine: &Machine,
    ram: i64,
    cores: i64,
) -> WardenResult<Machine> {
    let ram_change = (machine.ram != ram).then_some(ram);
    let cores_change = (machine.cores != cores).then_some(cores);

    if ram_change.is_none() && cores_change.is_none() {
        return Ok(machine.clone());
    }

    info!(
        machine_id = %machine.machine_id,
        ram_changed = ram_change.is_some(),
        cores_changed = cores_change.is_some(),
        "Recording hardware drift"
    );

    let updated = db
        .update_machine_hardware(&machine.api_key, &machine.machine_id, ram_change, cores_change)
        .await?;

    updated.ok_or_else(|| {
        WardenError::DatabaseError("machine row vanished during hardware update".to_string())
    })
}
