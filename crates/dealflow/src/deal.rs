//! Drives the post-selection purchase pipeline. Every forward transition
//! is gated by a collaborator-reported state, never by the orchestrator's
//! own timers; the pipeline never skips states and never re-enters an
//! earlier one, except the single contract re-upload retry.

use {
    crate::{
        collaborators::{
            ContractScanning, LenderGateway, Notifying, PaymentProcessing, PickupCoordination,
            Transition, with_timeout,
        },
        error::{Error, Result},
        storage::Storage,
    },
    chrono::Utc,
    model::{
        deal::{DealStatus, FeeCollection, FinancingPath, InsuranceEvidence, SelectedDeal},
        ids::DealId,
        partner::{PaymentOutcome, ScanStatus},
    },
    std::{sync::Arc, time::Duration},
};

pub struct DealOrchestrator {
    store: Arc<dyn Storage>,
    payments: Arc<dyn PaymentProcessing>,
    lender: Arc<dyn LenderGateway>,
    scanner: Arc<dyn ContractScanning>,
    pickup: Arc<dyn PickupCoordination>,
    notifier: Arc<dyn Notifying>,
    collaborator_timeout: Duration,
}

impl DealOrchestrator {
    pub fn new(
        store: Arc<dyn Storage>,
        payments: Arc<dyn PaymentProcessing>,
        lender: Arc<dyn LenderGateway>,
        scanner: Arc<dyn ContractScanning>,
        pickup: Arc<dyn PickupCoordination>,
        notifier: Arc<dyn Notifying>,
        collaborator_timeout: Duration,
    ) -> Self {
        Self {
            store,
            payments,
            lender,
            scanner,
            pickup,
            notifier,
            collaborator_timeout,
        }
    }

    pub async fn deal(&self, id: DealId) -> Result<SelectedDeal> {
        self.store.deal(id).await?.ok_or(Error::NotFound("deal"))
    }

    /// Timeline of a deal's status history, oldest first.
    pub async fn history(&self, id: DealId) -> Result<Vec<(chrono::DateTime<Utc>, DealStatus)>> {
        self.store.deal_events(id).await
    }

    /// Records the buyer's financing path and advances past the financing
    /// gate into fee collection.
    pub async fn select_financing(&self, id: DealId, path: FinancingPath) -> Result<()> {
        let deal = self.expect_status(id, DealStatus::PendingFinancing).await?;
        if !self.store.set_financing(id, path, Utc::now()).await? {
            return Err(Error::StaleState("financing path already recorded"));
        }
        self.advance(deal.id, DealStatus::PendingFinancing, DealStatus::FinancingSelected)
            .await?;
        self.advance(deal.id, DealStatus::FinancingSelected, DealStatus::FeePending)
            .await
    }

    /// Captures the service fee directly from the buyer. Mutually
    /// exclusive with [`Self::collect_fee_via_loan`] forever.
    pub async fn collect_fee_direct(&self, id: DealId) -> Result<()> {
        let deal = self.expect_status(id, DealStatus::FeePending).await?;
        let fee = self
            .store
            .fee_for_deal(id)
            .await?
            .ok_or(Error::NotFound("service fee"))?;
        let outcome = with_timeout(
            "payments",
            self.collaborator_timeout,
            self.payments.capture_fee(id, fee.final_amount),
        )
        .await?;
        match outcome {
            PaymentOutcome::Captured { reference } => {
                tracing::info!(deal = ?id, reference, amount = %fee.final_amount, "fee captured");
            }
            PaymentOutcome::Declined { reason } => {
                tracing::warn!(deal = ?id, reason, "fee capture declined");
                return Err(Error::PreconditionNotMet {
                    condition: "service fee capture was declined",
                });
            }
        }
        self.confirm_fee(deal, FeeCollection::DirectCapture).await
    }

    /// Rolls the service fee into the buyer's loan. Only valid for a deal
    /// financed through a lender.
    pub async fn collect_fee_via_loan(&self, id: DealId) -> Result<()> {
        let deal = self.expect_status(id, DealStatus::FeePending).await?;
        if !matches!(deal.financing, Some(FinancingPath::Lender { .. })) {
            return Err(Error::PreconditionNotMet {
                condition: "loan inclusion requires lender financing",
            });
        }
        let fee = self
            .store
            .fee_for_deal(id)
            .await?
            .ok_or(Error::NotFound("service fee"))?;
        let impact = with_timeout(
            "lender",
            self.collaborator_timeout,
            self.lender.authorize_fee_inclusion(id, fee.final_amount),
        )
        .await?;
        tracing::info!(
            deal = ?id,
            per_month = %impact.per_month,
            term_months = impact.term_months,
            "fee rolled into loan",
        );
        self.confirm_fee(deal, FeeCollection::LoanInclusion).await
    }

    async fn confirm_fee(&self, deal: SelectedDeal, method: FeeCollection) -> Result<()> {
        // once one method is confirmed the other stays disabled forever
        if !self.store.collect_fee(deal.id, method, Utc::now()).await? {
            return Err(Error::StaleState("service fee already collected"));
        }
        self.advance(deal.id, DealStatus::FeePending, DealStatus::FeePaid)
            .await?;
        self.advance(deal.id, DealStatus::FeePaid, DealStatus::InsurancePending)
            .await
    }

    /// Records the evidence satisfying the insurance gate, either a
    /// partner policy or verified proof of existing coverage.
    pub async fn complete_insurance(&self, id: DealId, evidence: InsuranceEvidence) -> Result<()> {
        let deal = self.expect_status(id, DealStatus::InsurancePending).await?;
        if !self
            .store
            .set_insurance_evidence(id, evidence, Utc::now())
            .await?
        {
            return Err(Error::StaleState("insurance evidence already recorded"));
        }
        self.advance(deal.id, DealStatus::InsurancePending, DealStatus::InsuranceComplete)
            .await?;
        self.advance(deal.id, DealStatus::InsuranceComplete, DealStatus::ContractPending)
            .await
    }

    /// Stores the contract document reference. Valid both for the first
    /// upload and for a re-upload after a failed scan.
    pub async fn upload_contract(&self, id: DealId, document: String) -> Result<()> {
        let deal = self.deal(id).await?;
        match deal.status {
            DealStatus::ContractPending => {
                self.store
                    .set_contract_document(id, document, Utc::now())
                    .await?;
                self.advance(id, DealStatus::ContractPending, DealStatus::ContractUploaded)
                    .await
            }
            // replacing the document while the scan gate is unpassed
            DealStatus::ContractUploaded => {
                self.store
                    .set_contract_document(id, document, Utc::now())
                    .await
            }
            _ => Err(Error::PreconditionNotMet {
                condition: "contract uploads require the contract stage",
            }),
        }
    }

    /// Consults the contract-verification gate. `PASS` advances to e-sign,
    /// `REVIEW_READY` advances only with the buyer's explicit
    /// acknowledgement, and `FAIL` sends the deal back for a re-upload.
    pub async fn advance_to_esign(&self, id: DealId, review_acknowledged: bool) -> Result<()> {
        let deal = self.expect_status(id, DealStatus::ContractUploaded).await?;
        let document = deal
            .contract_document
            .as_deref()
            .ok_or(Error::PreconditionNotMet {
                condition: "no contract document on file",
            })?;
        let report = with_timeout(
            "contract-verification",
            self.collaborator_timeout,
            self.scanner.scan_status(document),
        )
        .await?;
        tracing::debug!(deal = ?id, status = %report.status, checks = ?report.checks, "contract scan");
        match report.status {
            ScanStatus::Pass => {}
            ScanStatus::ReviewReady if review_acknowledged => {}
            ScanStatus::ReviewReady => {
                return Err(Error::PreconditionNotMet {
                    condition: "scan findings await buyer acknowledgement",
                });
            }
            ScanStatus::Fail => {
                // the single allowed backward edge
                self.advance(id, DealStatus::ContractUploaded, DealStatus::ContractPending)
                    .await?;
                return Err(Error::PreconditionNotMet {
                    condition: "contract scan failed, re-upload required",
                });
            }
            ScanStatus::Pending | ScanStatus::Running => {
                return Err(Error::PreconditionNotMet {
                    condition: "contract scan has not finished",
                });
            }
        }
        self.advance(id, DealStatus::ContractUploaded, DealStatus::EsignPending)
            .await
    }

    pub async fn complete_esign(&self, id: DealId) -> Result<()> {
        let deal = self.expect_status(id, DealStatus::EsignPending).await?;
        if !self.store.set_esign_completed(id, Utc::now()).await? {
            return Err(Error::StaleState("e-signature already recorded"));
        }
        self.advance(deal.id, DealStatus::EsignPending, DealStatus::EsignComplete)
            .await
    }

    /// Issues the unique pickup code. Requires insurance completion and
    /// e-sign completion, both.
    pub async fn schedule_pickup(&self, id: DealId) -> Result<()> {
        let deal = self.expect_status(id, DealStatus::EsignComplete).await?;
        if deal.insurance_evidence.is_none() {
            return Err(Error::PreconditionNotMet {
                condition: "insurance is not complete",
            });
        }
        if deal.esign_completed_at.is_none() {
            return Err(Error::PreconditionNotMet {
                condition: "e-signature is not complete",
            });
        }
        let code = with_timeout(
            "pickup",
            self.collaborator_timeout,
            self.pickup.issue_code(id),
        )
        .await?;
        if !self.store.set_pickup_code(id, code, Utc::now()).await? {
            return Err(Error::StaleState("pickup code already issued"));
        }
        self.advance(id, DealStatus::EsignComplete, DealStatus::PickupScheduled)
            .await
    }

    /// Validates the presented pickup code; a valid code is the sole
    /// trigger for completing the deal.
    pub async fn complete_pickup(&self, id: DealId, code: &str) -> Result<()> {
        self.expect_status(id, DealStatus::PickupScheduled).await?;
        let valid = with_timeout(
            "pickup",
            self.collaborator_timeout,
            self.pickup.validate_code(id, code),
        )
        .await?;
        if !valid {
            return Err(Error::PreconditionNotMet {
                condition: "pickup code was not valid",
            });
        }
        self.advance(id, DealStatus::PickupScheduled, DealStatus::Completed)
            .await
    }

    /// Cancels the deal from any non-terminal state. Idempotent: a second
    /// cancel succeeds without effect.
    pub async fn cancel(&self, id: DealId) -> Result<()> {
        let deal = self.deal(id).await?;
        match deal.status {
            DealStatus::Cancelled => return Ok(()),
            DealStatus::Completed => {
                return Err(Error::PreconditionNotMet {
                    condition: "a completed deal cannot be cancelled",
                });
            }
            _ => {}
        }
        if !self
            .store
            .transition_deal(id, deal.status, DealStatus::Cancelled, Utc::now())
            .await?
        {
            let deal = self.deal(id).await?;
            if deal.status == DealStatus::Cancelled {
                return Ok(());
            }
            return Err(Error::StaleState("deal status changed"));
        }
        self.store
            .record_deal_event(id, DealStatus::Cancelled, Utc::now())
            .await?;
        Metrics::get()
            .deal_transitions
            .with_label_values(&["cancelled"])
            .inc();
        tracing::info!(deal = ?id, "deal cancelled");
        self.notifier
            .transition(Transition::Deal {
                id,
                status: DealStatus::Cancelled,
            })
            .await;
        Ok(())
    }

    async fn expect_status(&self, id: DealId, status: DealStatus) -> Result<SelectedDeal> {
        let deal = self.deal(id).await?;
        if deal.status != status {
            return Err(Error::PreconditionNotMet {
                condition: stage_gate(status),
            });
        }
        Ok(deal)
    }

    /// One guarded step along the pipeline, with its event and
    /// notification. The edge is validated before touching storage.
    async fn advance(&self, id: DealId, from: DealStatus, to: DealStatus) -> Result<()> {
        debug_assert!(DealStatus::may_transition(from, to));
        let now = Utc::now();
        if !self.store.transition_deal(id, from, to, now).await? {
            return Err(Error::StaleState("deal status changed"));
        }
        self.store.record_deal_event(id, to, now).await?;
        Metrics::get()
            .deal_transitions
            .with_label_values(&[to.as_ref()])
            .inc();
        self.notifier
            .transition(Transition::Deal { id, status: to })
            .await;
        Ok(())
    }
}

/// The condition string surfaced when a call arrives at the wrong stage.
fn stage_gate(required: DealStatus) -> &'static str {
    match required {
        DealStatus::PendingFinancing => "deal must be awaiting a financing selection",
        DealStatus::FinancingSelected => "deal must have a financing path selected",
        DealStatus::FeePending => "deal must be awaiting fee collection",
        DealStatus::FeePaid => "deal must have its fee settled",
        DealStatus::InsurancePending => "deal must be awaiting insurance",
        DealStatus::InsuranceComplete => "deal must have insurance complete",
        DealStatus::ContractPending => "deal must be awaiting a contract upload",
        DealStatus::ContractUploaded => "deal must have a contract uploaded",
        DealStatus::EsignPending => "deal must be awaiting e-signature",
        DealStatus::EsignComplete => "deal must have e-signature complete",
        DealStatus::PickupScheduled => "deal must have a pickup scheduled",
        DealStatus::Completed | DealStatus::Cancelled => "deal is in a terminal state",
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "deals")]
struct Metrics {
    /// Number of pipeline transitions performed, by resulting status.
    #[metric(labels("status"))]
    deal_transitions: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
