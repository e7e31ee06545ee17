//! In-process reproduction of the flight oracle contract.
//!
//! Behaves like the deployed contract: oracles pay a fee to register and get
//! three distinct indexes, `fetch_flight_status` opens a response slot under
//! a random index and emits `OracleRequest`, and responses are only accepted
//! from oracles holding that index while the slot is open. Once any status
//! collects [`MIN_RESPONSES`] reports the flight status is recorded as
//! verified. The slot stays open afterwards, so late reports still land.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use super::{Ledger, RejectReason, RequestSubscription, SubmissionOutcome};
use crate::error::LedgerError;
use crate::models::{FlightKey, FlightRequest, FlightStatus, Identity, OracleIndexes, MAX_INDEX};

pub const ONE_ETHER: u128 = 1_000_000_000_000_000_000;
pub const DEFAULT_REGISTRATION_FEE: u128 = ONE_ETHER;
pub const MIN_RESPONSES: usize = 3;
pub const DEFAULT_ACCOUNT_COUNT: usize = 200;
pub const DEFAULT_MNEMONIC: &str = "flight surety local oracle network development mnemonic";

/// Derive `count` stable addresses from a mnemonic.
pub fn derive_accounts(mnemonic: &str, count: usize) -> Vec<Identity> {
    (0..count as u64)
        .map(|i| {
            let mut hasher = Sha256::new();
            hasher.update(mnemonic.as_bytes());
            hasher.update(i.to_be_bytes());
            let digest = hasher.finalize();
            Identity::new(format!("0x{}", hex::encode(&digest[..20])))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResponseKey {
    index: u8,
    flight: FlightKey,
}

impl ResponseKey {
    fn of(request: &FlightRequest) -> Self {
        Self {
            index: request.request_index,
            flight: request.key(),
        }
    }
}

#[derive(Debug)]
struct ResponseSlot {
    requester: Identity,
    is_open: bool,
    reports: HashMap<FlightStatus, Vec<Identity>>,
}

/// An accepted oracle response, as the contract's `OracleReport` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReport {
    pub oracle: Identity,
    pub request: FlightRequest,
    pub status: FlightStatus,
}

struct ContractState {
    rng: StdRng,
    oracles: HashMap<Identity, OracleIndexes>,
    scripted_indexes: VecDeque<OracleIndexes>,
    responses: HashMap<ResponseKey, ResponseSlot>,
    reports: Vec<OracleReport>,
    verified: HashMap<FlightKey, FlightStatus>,
    subscribers: Vec<mpsc::UnboundedSender<Result<FlightRequest, LedgerError>>>,
}

impl ContractState {
    fn random_index(&mut self) -> u8 {
        self.rng.gen_range(0..MAX_INDEX)
    }

    fn generate_indexes(&mut self) -> OracleIndexes {
        if let Some(indexes) = self.scripted_indexes.pop_front() {
            return indexes;
        }

        let first = self.random_index();
        let mut second = self.random_index();
        while second == first {
            second = self.random_index();
        }
        let mut third = self.random_index();
        while third == first || third == second {
            third = self.random_index();
        }
        [first, second, third]
    }

    fn open_request(&mut self, requester: &Identity, request: FlightRequest) {
        self.responses.insert(
            ResponseKey::of(&request),
            ResponseSlot {
                requester: requester.clone(),
                is_open: true,
                reports: HashMap::new(),
            },
        );
        // Closed receivers are pruned on emit.
        self.subscribers
            .retain(|subscriber| subscriber.send(Ok(request.clone())).is_ok());
    }
}

pub struct SimulatedLedger {
    accounts: Vec<Identity>,
    registration_fee: u128,
    min_responses: usize,
    latency: Option<(Duration, Duration)>,
    state: Mutex<ContractState>,
}

impl SimulatedLedger {
    pub fn builder() -> SimulatedLedgerBuilder {
        SimulatedLedgerBuilder::default()
    }

    pub fn registration_fee(&self) -> u128 {
        self.registration_fee
    }

    pub fn registered_oracles(&self) -> usize {
        self.lock().oracles.len()
    }

    /// Live `OracleRequest` subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|subscriber| !subscriber.is_closed());
        state.subscribers.len()
    }

    /// Open a request under a chosen index and emit it to subscribers.
    pub fn open_request(
        &self,
        requester: &Identity,
        index: u8,
        airline: &Identity,
        flight: &str,
        timestamp: u64,
    ) -> FlightRequest {
        let request = FlightRequest {
            request_index: index,
            airline: airline.clone(),
            flight: flight.to_string(),
            timestamp,
        };
        self.lock().open_request(requester, request.clone());
        request
    }

    /// Close the response slot of a request, as a finalized request would be.
    pub fn close_request(&self, request: &FlightRequest) {
        if let Some(slot) = self.lock().responses.get_mut(&ResponseKey::of(request)) {
            slot.is_open = false;
        }
    }

    /// Account that raised the request, if a slot was ever opened for it.
    pub fn requester_of(&self, request: &FlightRequest) -> Option<Identity> {
        self.lock()
            .responses
            .get(&ResponseKey::of(request))
            .map(|slot| slot.requester.clone())
    }

    pub fn verified_status(&self, key: &FlightKey) -> Option<FlightStatus> {
        self.lock().verified.get(key).copied()
    }

    pub fn reports_for(&self, key: &FlightKey) -> Vec<OracleReport> {
        self.lock()
            .reports
            .iter()
            .filter(|report| &report.request.key() == key)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, ContractState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let Some((min, max)) = self.latency else {
            return;
        };
        let delay = self.lock().rng.gen_range(min..=max);
        tokio::time::sleep(delay).await;
    }
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[async_trait]
impl Ledger for SimulatedLedger {
    async fn accounts(&self) -> Result<Vec<Identity>, LedgerError> {
        Ok(self.accounts.clone())
    }

    async fn fetch_registration_fee(&self) -> Result<u128, LedgerError> {
        self.simulate_latency().await;
        Ok(self.registration_fee)
    }

    async fn register_oracle(&self, identity: &Identity, fee: u128) -> Result<(), LedgerError> {
        self.simulate_latency().await;
        let mut state = self.lock();

        if fee < self.registration_fee {
            return Err(LedgerError::InsufficientFee {
                required: self.registration_fee,
                paid: fee,
            });
        }
        if state.oracles.contains_key(identity) {
            return Err(LedgerError::AlreadyRegistered);
        }

        let indexes = state.generate_indexes();
        state.oracles.insert(identity.clone(), indexes);
        Ok(())
    }

    async fn get_assigned_indexes(&self, identity: &Identity) -> Result<OracleIndexes, LedgerError> {
        self.simulate_latency().await;
        self.lock()
            .oracles
            .get(identity)
            .copied()
            .ok_or(LedgerError::NotRegistered)
    }

    async fn subscribe_oracle_requests(&self) -> Result<RequestSubscription, LedgerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        Ok(RequestSubscription::new(rx))
    }

    async fn submit_oracle_response(
        &self,
        identity: &Identity,
        request: &FlightRequest,
        status: FlightStatus,
    ) -> Result<SubmissionOutcome, LedgerError> {
        self.simulate_latency().await;
        let mut state = self.lock();

        let Some(indexes) = state.oracles.get(identity) else {
            return Ok(SubmissionOutcome::Rejected(RejectReason::NotRegistered));
        };
        if !indexes.contains(&request.request_index) {
            return Ok(SubmissionOutcome::Rejected(RejectReason::IndexMismatch));
        }

        let min_responses = self.min_responses;
        let reported = match state.responses.get_mut(&ResponseKey::of(request)) {
            Some(slot) if slot.is_open => {
                let reporters = slot.reports.entry(status).or_default();
                reporters.push(identity.clone());
                reporters.len()
            }
            _ => return Ok(SubmissionOutcome::Rejected(RejectReason::RequestClosed)),
        };

        state.reports.push(OracleReport {
            oracle: identity.clone(),
            request: request.clone(),
            status,
        });
        if reported >= min_responses {
            state.verified.entry(request.key()).or_insert(status);
        }

        Ok(SubmissionOutcome::Accepted)
    }

    async fn fetch_flight_status(
        &self,
        caller: &Identity,
        airline: &Identity,
        flight: &str,
        timestamp: u64,
    ) -> Result<u8, LedgerError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        let index = state.random_index();
        state.open_request(
            caller,
            FlightRequest {
                request_index: index,
                airline: airline.clone(),
                flight: flight.to_string(),
                timestamp,
            },
        );
        Ok(index)
    }
}

pub struct SimulatedLedgerBuilder {
    mnemonic: String,
    account_count: usize,
    registration_fee: u128,
    min_responses: usize,
    seed: Option<u64>,
    scripted_indexes: Vec<OracleIndexes>,
    latency: Option<(Duration, Duration)>,
}

impl Default for SimulatedLedgerBuilder {
    fn default() -> Self {
        Self {
            mnemonic: DEFAULT_MNEMONIC.to_string(),
            account_count: DEFAULT_ACCOUNT_COUNT,
            registration_fee: DEFAULT_REGISTRATION_FEE,
            min_responses: MIN_RESPONSES,
            seed: None,
            scripted_indexes: Vec::new(),
            latency: None,
        }
    }
}

impl SimulatedLedgerBuilder {
    pub fn mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.mnemonic = mnemonic.into();
        self
    }

    pub fn accounts(mut self, count: usize) -> Self {
        self.account_count = count;
        self
    }

    pub fn registration_fee(mut self, fee: u128) -> Self {
        self.registration_fee = fee;
        self
    }

    pub fn min_responses(mut self, min_responses: usize) -> Self {
        self.min_responses = min_responses;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Index triples handed out, in registration order, before random ones.
    pub fn scripted_indexes(mut self, indexes: impl IntoIterator<Item = OracleIndexes>) -> Self {
        self.scripted_indexes = indexes.into_iter().collect();
        self
    }

    /// Random delay applied to every ledger call.
    pub fn latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = Some((min, max.max(min)));
        self
    }

    pub fn build(self) -> SimulatedLedger {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        SimulatedLedger {
            accounts: derive_accounts(&self.mnemonic, self.account_count),
            registration_fee: self.registration_fee,
            min_responses: self.min_responses,
            latency: self.latency,
            state: Mutex::new(ContractState {
                rng,
                oracles: HashMap::new(),
                scripted_indexes: self.scripted_indexes.into(),
                responses: HashMap::new(),
                reports: Vec::new(),
                verified: HashMap::new(),
                subscribers: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> SimulatedLedger {
        SimulatedLedger::builder().accounts(20).seed(7).build()
    }

    #[test]
    fn accounts_are_stable_and_distinct() {
        let a = derive_accounts("seed words", 5);
        let b = derive_accounts("seed words", 5);
        assert_eq!(a, b);
        assert_eq!(a[0].as_str().len(), 42);
        assert!(a[0].as_str().starts_with("0x"));

        let mut unique = a.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);
        assert_ne!(derive_accounts("other words", 1)[0], a[0]);
    }

    #[tokio::test]
    async fn registration_requires_the_fee() {
        let ledger = ledger();
        let oracle = ledger.accounts[1].clone();

        let err = ledger
            .register_oracle(&oracle, DEFAULT_REGISTRATION_FEE - 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFee {
                required: DEFAULT_REGISTRATION_FEE,
                paid: DEFAULT_REGISTRATION_FEE - 1
            }
        );
        assert_eq!(
            ledger.get_assigned_indexes(&oracle).await,
            Err(LedgerError::NotRegistered)
        );
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let ledger = ledger();
        let oracle = ledger.accounts[1].clone();
        ledger.register_oracle(&oracle, DEFAULT_REGISTRATION_FEE).await.unwrap();
        assert_eq!(
            ledger.register_oracle(&oracle, DEFAULT_REGISTRATION_FEE).await,
            Err(LedgerError::AlreadyRegistered)
        );
        assert_eq!(ledger.registered_oracles(), 1);
    }

    #[tokio::test]
    async fn random_indexes_are_distinct_and_in_range() {
        let ledger = ledger();
        for oracle in ledger.accounts.clone() {
            ledger.register_oracle(&oracle, DEFAULT_REGISTRATION_FEE).await.unwrap();
            let [a, b, c] = ledger.get_assigned_indexes(&oracle).await.unwrap();
            assert!(a < MAX_INDEX && b < MAX_INDEX && c < MAX_INDEX);
            assert!(a != b && b != c && a != c);
        }
    }

    #[tokio::test]
    async fn scripted_indexes_are_used_in_order() {
        let ledger = SimulatedLedger::builder()
            .accounts(3)
            .scripted_indexes([[4, 4, 4], [1, 2, 3]])
            .build();
        let accounts = ledger.accounts.clone();
        for oracle in &accounts {
            ledger.register_oracle(oracle, DEFAULT_REGISTRATION_FEE).await.unwrap();
        }
        assert_eq!(ledger.get_assigned_indexes(&accounts[0]).await.unwrap(), [4, 4, 4]);
        assert_eq!(ledger.get_assigned_indexes(&accounts[1]).await.unwrap(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn responses_are_checked_against_index_and_open_request() {
        let ledger = SimulatedLedger::builder()
            .accounts(4)
            .scripted_indexes([[1, 2, 3], [5, 6, 7]])
            .build();
        let accounts = ledger.accounts.clone();
        let (holder, other, stranger) = (&accounts[0], &accounts[1], &accounts[3]);
        ledger.register_oracle(holder, DEFAULT_REGISTRATION_FEE).await.unwrap();
        ledger.register_oracle(other, DEFAULT_REGISTRATION_FEE).await.unwrap();

        let airline = &accounts[2];
        let unopened = FlightRequest {
            request_index: 2,
            airline: airline.clone(),
            flight: "ND1309".into(),
            timestamp: 1,
        };
        assert_eq!(
            ledger
                .submit_oracle_response(holder, &unopened, FlightStatus::OnTime)
                .await
                .unwrap(),
            SubmissionOutcome::Rejected(RejectReason::RequestClosed)
        );

        let request = ledger.open_request(airline, 2, airline, "ND1309", 1);
        assert_eq!(
            ledger
                .submit_oracle_response(other, &request, FlightStatus::OnTime)
                .await
                .unwrap(),
            SubmissionOutcome::Rejected(RejectReason::IndexMismatch)
        );
        assert_eq!(
            ledger
                .submit_oracle_response(stranger, &request, FlightStatus::OnTime)
                .await
                .unwrap(),
            SubmissionOutcome::Rejected(RejectReason::NotRegistered)
        );
        assert!(ledger
            .submit_oracle_response(holder, &request, FlightStatus::OnTime)
            .await
            .unwrap()
            .is_accepted());

        ledger.close_request(&request);
        assert_eq!(
            ledger
                .submit_oracle_response(holder, &request, FlightStatus::OnTime)
                .await
                .unwrap(),
            SubmissionOutcome::Rejected(RejectReason::RequestClosed)
        );
        assert_eq!(ledger.reports_for(&request.key()).len(), 1);
    }

    #[tokio::test]
    async fn first_status_with_enough_reports_is_verified() {
        let ledger = SimulatedLedger::builder()
            .accounts(6)
            .scripted_indexes(std::iter::repeat([0, 1, 2]).take(6))
            .build();
        let accounts = ledger.accounts.clone();
        for oracle in &accounts {
            ledger.register_oracle(oracle, DEFAULT_REGISTRATION_FEE).await.unwrap();
        }
        let request = ledger.open_request(&accounts[0], 1, &accounts[0], "IB3971", 99);

        let statuses = [
            FlightStatus::OnTime,
            FlightStatus::LateAirline,
            FlightStatus::LateAirline,
            FlightStatus::LateAirline,
            FlightStatus::OnTime,
            FlightStatus::OnTime,
        ];
        for (oracle, status) in accounts.iter().zip(statuses) {
            let outcome = ledger.submit_oracle_response(oracle, &request, status).await.unwrap();
            assert!(outcome.is_accepted());
        }

        assert_eq!(ledger.verified_status(&request.key()), Some(FlightStatus::LateAirline));
        assert_eq!(ledger.reports_for(&request.key()).len(), 6);
    }

    #[tokio::test]
    async fn subscribers_only_see_requests_raised_after_subscribing() {
        let ledger = ledger();
        let airline = ledger.accounts[0].clone();
        ledger.open_request(&airline, 3, &airline, "EARLY", 1);

        let mut subscription = ledger.subscribe_oracle_requests().await.unwrap();
        let index = ledger
            .fetch_flight_status(&airline, &airline, "LATE", 2)
            .await
            .unwrap();

        let request = subscription.next().await.unwrap().unwrap();
        assert_eq!(request.flight, "LATE");
        assert_eq!(request.request_index, index);
        assert!(index < MAX_INDEX);
    }

    #[tokio::test]
    async fn response_slots_remember_who_raised_them() {
        let ledger = ledger();
        let (airline, passenger) = (ledger.accounts[0].clone(), ledger.accounts[1].clone());

        let direct = ledger.open_request(&passenger, 2, &airline, "ND1309", 1);
        assert_eq!(ledger.requester_of(&direct), Some(passenger.clone()));

        let index = ledger
            .fetch_flight_status(&airline, &airline, "BA2871", 5)
            .await
            .unwrap();
        let fetched = FlightRequest {
            request_index: index,
            airline: airline.clone(),
            flight: "BA2871".to_string(),
            timestamp: 5,
        };
        assert_eq!(ledger.requester_of(&fetched), Some(airline));

        let never_opened = FlightRequest {
            flight: "NOPE".to_string(),
            ..direct
        };
        assert_eq!(ledger.requester_of(&never_opened), None);
    }
}
