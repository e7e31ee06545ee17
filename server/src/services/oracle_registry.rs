//! Oracle registration against the ledger.
//!
//! The registration fee is read once when the registry is bootstrapped and
//! paid by every identity registered afterwards. Each registration stands on
//! its own: a failure is reported for that identity and never stops the
//! others.

use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::error::{LedgerError, RegistrationError};
use crate::ledger::Ledger;
use crate::models::{Identity, OracleRecord, MAX_INDEX};

/// Outcome of registering a batch of identities.
#[derive(Debug, Default)]
pub struct RegistrationSummary {
    pub registered: Vec<OracleRecord>,
    pub failed: Vec<RegistrationError>,
}

pub struct OracleRegistry {
    ledger: Arc<dyn Ledger>,
    fee: u128,
    records: RwLock<Vec<OracleRecord>>,
}

impl OracleRegistry {
    /// Fetch the registration fee and build an empty registry.
    pub async fn bootstrap(ledger: Arc<dyn Ledger>) -> Result<Self, LedgerError> {
        let fee = ledger.fetch_registration_fee().await?;
        info!(fee = %fee, "registration fee fetched");
        Ok(Self::with_fee(ledger, fee))
    }

    pub fn with_fee(ledger: Arc<dyn Ledger>, fee: u128) -> Self {
        Self {
            ledger,
            fee,
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn fee(&self) -> u128 {
        self.fee
    }

    pub async fn register(&self, identity: &Identity) -> Result<OracleRecord, RegistrationError> {
        if self.get(identity).is_some() {
            return Err(RegistrationError::AlreadyRegistered(identity.clone()));
        }

        self.ledger
            .register_oracle(identity, self.fee)
            .await
            .map_err(|err| RegistrationError::from_ledger(identity, err))?;

        let indexes = self
            .ledger
            .get_assigned_indexes(identity)
            .await
            .map_err(|err| RegistrationError::from_ledger(identity, err))?;

        if let Some(bad) = indexes.iter().find(|index| **index >= MAX_INDEX) {
            return Err(RegistrationError::LedgerRejected {
                identity: identity.clone(),
                source: LedgerError::Malformed(format!("assigned index {bad} out of range")),
            });
        }

        let record = OracleRecord::new(identity.clone(), indexes);
        {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            if records.iter().any(|existing| existing.identity == *identity) {
                return Err(RegistrationError::AlreadyRegistered(identity.clone()));
            }
            records.push(record.clone());
        }

        info!(
            oracle = %identity,
            indexes = ?record.indexes,
            "oracle registered"
        );
        Ok(record)
    }

    /// Register every identity concurrently, collecting failures per identity.
    pub async fn register_all(&self, identities: &[Identity]) -> RegistrationSummary {
        let results = join_all(identities.iter().map(|identity| self.register(identity))).await;

        let mut summary = RegistrationSummary::default();
        for result in results {
            match result {
                Ok(record) => summary.registered.push(record),
                Err(err) => {
                    warn!(oracle = %err.identity(), error = %err, "oracle registration failed");
                    summary.failed.push(err);
                }
            }
        }

        info!(
            registered = summary.registered.len(),
            failed = summary.failed.len(),
            "oracle registration complete"
        );
        summary
    }

    pub fn get(&self, identity: &Identity) -> Option<OracleRecord> {
        self.read()
            .iter()
            .find(|record| record.identity == *identity)
            .cloned()
    }

    /// Snapshot of every registered oracle, in registration order.
    pub fn records(&self) -> Vec<OracleRecord> {
        self.read().clone()
    }

    pub fn matching(&self, request_index: u8) -> Vec<OracleRecord> {
        self.read()
            .iter()
            .filter(|record| record.holds(request_index))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<OracleRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::simulated::{SimulatedLedger, DEFAULT_REGISTRATION_FEE};

    async fn setup(ledger: SimulatedLedger) -> (Arc<SimulatedLedger>, Vec<Identity>) {
        let ledger = Arc::new(ledger);
        let accounts = ledger.accounts().await.unwrap();
        (ledger, accounts)
    }

    #[tokio::test]
    async fn bootstrap_reads_the_fee_once() {
        let (ledger, _) = setup(SimulatedLedger::builder().registration_fee(42).build()).await;
        let registry = OracleRegistry::bootstrap(ledger).await.unwrap();
        assert_eq!(registry.fee(), 42);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn registers_forty_oracles_with_indexes_in_range() {
        let (ledger, accounts) = setup(SimulatedLedger::builder().accounts(46).seed(1).build()).await;
        let registry = OracleRegistry::bootstrap(ledger).await.unwrap();

        let summary = registry.register_all(&accounts[6..46]).await;
        assert_eq!(summary.registered.len(), 40);
        assert!(summary.failed.is_empty());
        assert_eq!(registry.len(), 40);
        for record in registry.records() {
            assert!(record.indexes.iter().all(|index| *index < MAX_INDEX));
        }
    }

    #[tokio::test]
    async fn underpaid_registration_yields_no_record() {
        let (ledger, accounts) = setup(SimulatedLedger::builder().accounts(8).build()).await;
        let registry = OracleRegistry::with_fee(ledger, DEFAULT_REGISTRATION_FEE / 2);

        let err = registry.register(&accounts[6]).await.unwrap_err();
        assert_eq!(
            err,
            RegistrationError::InsufficientFee {
                identity: accounts[6].clone(),
                required: DEFAULT_REGISTRATION_FEE,
                paid: DEFAULT_REGISTRATION_FEE / 2,
            }
        );
        assert!(registry.get(&accounts[6]).is_none());
    }

    #[tokio::test]
    async fn duplicates_fail_without_aborting_the_batch() {
        let (ledger, accounts) = setup(SimulatedLedger::builder().accounts(10).build()).await;
        let registry = OracleRegistry::bootstrap(ledger).await.unwrap();
        registry.register(&accounts[6]).await.unwrap();

        let summary = registry.register_all(&accounts[6..10]).await;
        assert_eq!(summary.registered.len(), 3);
        assert_eq!(
            summary.failed,
            vec![RegistrationError::AlreadyRegistered(accounts[6].clone())]
        );
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn out_of_range_indexes_are_refused() {
        let ledger = SimulatedLedger::builder()
            .accounts(2)
            .scripted_indexes([[1, 2, 12]])
            .build();
        let (ledger, accounts) = setup(ledger).await;
        let registry = OracleRegistry::bootstrap(ledger).await.unwrap();

        let err = registry.register(&accounts[0]).await.unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::LedgerRejected {
                ref identity,
                source: LedgerError::Malformed(_),
            } if *identity == accounts[0]
        ));
        assert!(registry.get(&accounts[0]).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn matching_filters_by_request_index() {
        let ledger = SimulatedLedger::builder()
            .accounts(3)
            .scripted_indexes([[0, 4, 8], [1, 2, 3], [4, 5, 6]])
            .build();
        let (ledger, accounts) = setup(ledger).await;
        let registry = OracleRegistry::bootstrap(ledger).await.unwrap();
        for identity in &accounts {
            registry.register(identity).await.unwrap();
        }

        let holders: Vec<Identity> = registry
            .matching(4)
            .into_iter()
            .map(|record| record.identity)
            .collect();
        assert_eq!(holders, vec![accounts[0].clone(), accounts[2].clone()]);
        assert!(registry.matching(9).is_empty());
    }
}
