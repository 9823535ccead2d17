//! Vocabulary shared with external collaborators (inventory, contract
//! verification, payments). Only the states the engine consumes are modeled;
//! the collaborators' internals are out of scope.

use crate::money::Cents;

/// Inventory collaborator's answer for a referenced vehicle.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    serde::Deserialize,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VehicleAvailability {
    Available,
    Sold,
    Removed,
}

/// Contract-verification scan status consulted by the e-sign gate.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    serde::Deserialize,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Pass,
    /// Findings that need an explicit buyer acknowledgement before e-sign.
    ReviewReady,
    Fail,
}

/// Individual checks reported alongside the scan status.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScanChecks {
    pub apr_matches: bool,
    pub otd_matches: bool,
    pub junk_fees_detected: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScanReport {
    pub status: ScanStatus,
    pub checks: ScanChecks,
}

/// Outcome of a payment capture request.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PaymentOutcome {
    Captured { reference: String },
    Declined { reason: String },
}

/// Monthly payment impact reported by the lender when the service fee is
/// rolled into the loan principal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MonthlyImpact {
    pub per_month: Cents,
    pub term_months: u32,
}
