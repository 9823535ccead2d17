use {
    crate::{
        ids::{AuctionId, BuyerId, DealId, DealerId, DepositId, OfferId, VehicleId},
        money::Cents,
    },
    chrono::{DateTime, Utc},
};

/// The post-selection purchase pipeline.
///
/// Strictly linear; the only backward edge is
/// `ContractUploaded -> ContractPending` after a failed contract scan, and
/// `Cancelled` is reachable from every non-terminal state.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    serde::Deserialize,
    serde::Serialize,
    strum::AsRefStr,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DealStatus {
    PendingFinancing,
    FinancingSelected,
    FeePending,
    FeePaid,
    InsurancePending,
    InsuranceComplete,
    ContractPending,
    ContractUploaded,
    EsignPending,
    EsignComplete,
    PickupScheduled,
    Completed,
    Cancelled,
}

impl DealStatus {
    /// The unique forward successor in the pipeline.
    pub fn next(self) -> Option<Self> {
        use DealStatus::*;
        match self {
            PendingFinancing => Some(FinancingSelected),
            FinancingSelected => Some(FeePending),
            FeePending => Some(FeePaid),
            FeePaid => Some(InsurancePending),
            InsurancePending => Some(InsuranceComplete),
            InsuranceComplete => Some(ContractPending),
            ContractPending => Some(ContractUploaded),
            ContractUploaded => Some(EsignPending),
            EsignPending => Some(EsignComplete),
            EsignComplete => Some(PickupScheduled),
            PickupScheduled => Some(Completed),
            Completed | Cancelled => None,
        }
    }

    /// Position along the pipeline, used to check monotonicity. `None` for
    /// `Cancelled` which sits outside the linear order.
    pub fn index(self) -> Option<usize> {
        use DealStatus::*;
        const ORDER: [DealStatus; 12] = [
            PendingFinancing,
            FinancingSelected,
            FeePending,
            FeePaid,
            InsurancePending,
            InsuranceComplete,
            ContractPending,
            ContractUploaded,
            EsignPending,
            EsignComplete,
            PickupScheduled,
            Completed,
        ];
        ORDER.iter().position(|status| *status == self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `from -> to` is a legal transition.
    pub fn may_transition(from: Self, to: Self) -> bool {
        if to == Self::Cancelled {
            return !from.is_terminal();
        }
        if from == Self::ContractUploaded && to == Self::ContractPending {
            // contract scan failed, buyer re-uploads
            return true;
        }
        from.next() == Some(to)
    }
}

/// How the buyer finances the purchase.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancingPath {
    Cash,
    Lender { lender_ref: String },
}

/// Evidence that satisfied the insurance gate.
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
pub enum InsuranceEvidence {
    /// A partner quote converted to an active policy.
    PartnerPolicy,
    /// Uploaded and verified proof of existing coverage.
    ProofUpload,
}

/// How the service fee was collected. The two methods are mutually
/// exclusive; once one is confirmed the other is permanently disabled.
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
pub enum FeeCollection {
    DirectCapture,
    LoanInclusion,
}

/// The single record created upon exclusive winner selection. Owns the
/// purchase pipeline and is the sole writer of deposit-credit and service
/// fee records for the transaction.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SelectedDeal {
    pub id: DealId,
    pub auction_id: AuctionId,
    pub buyer_id: BuyerId,
    pub dealer_id: DealerId,
    pub offer_id: OfferId,
    pub vehicle_id: VehicleId,
    pub status: DealStatus,
    pub financing: Option<FinancingPath>,
    pub insurance_evidence: Option<InsuranceEvidence>,
    pub contract_document: Option<String>,
    pub esign_completed_at: Option<DateTime<Utc>>,
    pub pickup_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

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
pub enum DepositStatus {
    Pending,
    Paid,
    /// A refund was started but the payment collaborator has not confirmed
    /// it yet; the refund is retried from here, never re-entered from
    /// `Paid` twice.
    RefundPending,
    Refunded,
    Failed,
}

/// The buyer's refundable auction deposit. Refunded XOR credited against
/// the service fee, never both.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Deposit {
    pub id: DepositId,
    pub auction_id: AuctionId,
    pub buyer_id: BuyerId,
    pub amount: Cents,
    pub status: DepositStatus,
    pub created_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub credited_deal: Option<DealId>,
}

/// The service fee owed on a selected deal:
/// `final_amount = base - deposit_credit`.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ServiceFee {
    pub deal_id: DealId,
    pub base: Cents,
    pub deposit_credit: Cents,
    pub final_amount: Cents,
    pub collected: Option<FeeCollection>,
    pub collected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_is_linear() {
        let mut status = DealStatus::PendingFinancing;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            status = next;
            seen.push(status);
        }
        assert_eq!(status, DealStatus::Completed);
        assert_eq!(seen.len(), 12);
        // indices strictly increase along the walk
        for pair in seen.windows(2) {
            assert!(pair[0].index().unwrap() < pair[1].index().unwrap());
        }
    }

    #[test]
    fn no_skipping_states() {
        assert!(!DealStatus::may_transition(
            DealStatus::PendingFinancing,
            DealStatus::FeePending
        ));
        assert!(!DealStatus::may_transition(
            DealStatus::FeePaid,
            DealStatus::ContractPending
        ));
        assert!(DealStatus::may_transition(
            DealStatus::FeePending,
            DealStatus::FeePaid
        ));
    }

    #[test]
    fn contract_retry_is_the_only_backward_edge() {
        assert!(DealStatus::may_transition(
            DealStatus::ContractUploaded,
            DealStatus::ContractPending
        ));
        assert!(!DealStatus::may_transition(
            DealStatus::EsignPending,
            DealStatus::ContractUploaded
        ));
        assert!(!DealStatus::may_transition(
            DealStatus::FeePaid,
            DealStatus::FeePending
        ));
    }

    #[test]
    fn cancel_from_any_non_terminal_state() {
        assert!(DealStatus::may_transition(
            DealStatus::PendingFinancing,
            DealStatus::Cancelled
        ));
        assert!(DealStatus::may_transition(
            DealStatus::PickupScheduled,
            DealStatus::Cancelled
        ));
        assert!(!DealStatus::may_transition(
            DealStatus::Completed,
            DealStatus::Cancelled
        ));
        assert!(!DealStatus::may_transition(
            DealStatus::Cancelled,
            DealStatus::Cancelled
        ));
    }
}
