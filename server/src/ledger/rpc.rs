//! JSON-RPC gateway client for a deployed oracle contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{Ledger, RejectReason, RequestSubscription, SubmissionOutcome};
use crate::error::LedgerError;
use crate::models::{FlightRequest, FlightStatus, Identity, OracleIndexes, INDEXES_PER_ORACLE};

const ERR_INSUFFICIENT_FEE: i64 = -32010;
const ERR_ALREADY_REGISTERED: i64 = -32011;
const ERR_NOT_REGISTERED: i64 = -32012;
const ERR_INDEX_MISMATCH: i64 = -32020;
const ERR_REQUEST_CLOSED: i64 = -32021;

/// Upper bound on ledgers scanned per poll.
const MAX_LEDGER_RANGE: u64 = 200;

pub const ORACLE_REQUEST_EVENT: &str = "OracleRequest";

/// Failure of a single JSON-RPC call.
#[derive(Debug)]
enum CallError {
    Rpc {
        code: i64,
        message: String,
        data: Value,
    },
    Ledger(LedgerError),
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        CallError::Ledger(err.into())
    }
}

impl CallError {
    fn into_ledger_error(self) -> LedgerError {
        match self {
            CallError::Ledger(err) => err,
            CallError::Rpc { code, message, data } => match code {
                ERR_INSUFFICIENT_FEE => LedgerError::InsufficientFee {
                    required: data.get("required").and_then(parse_amount).unwrap_or_default(),
                    paid: data.get("paid").and_then(parse_amount).unwrap_or_default(),
                },
                ERR_ALREADY_REGISTERED => LedgerError::AlreadyRegistered,
                ERR_NOT_REGISTERED => LedgerError::NotRegistered,
                _ => LedgerError::Reverted(format!("{message} (code {code})")),
            },
        }
    }
}

#[derive(Clone)]
pub struct RpcLedger {
    rpc_url: String,
    http: Client,
    poll_interval: Duration,
}

impl RpcLedger {
    pub fn new(rpc_url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            http: Client::new(),
            poll_interval,
        }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, CallError> {
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": "flight-oracle-server",
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        if let Some(error) = response.get("error") {
            return Err(CallError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                data: error.get("data").cloned().unwrap_or(Value::Null),
            });
        }

        response.get("result").cloned().ok_or_else(|| {
            CallError::Ledger(LedgerError::Malformed(format!("{method}: missing result")))
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        self.rpc_call(method, params)
            .await
            .map_err(CallError::into_ledger_error)
    }

    async fn latest_ledger(&self) -> Result<u64, LedgerError> {
        let result = self.call("oracle_latestLedger", json!({})).await?;
        result
            .get("sequence")
            .and_then(parse_u64)
            .or_else(|| parse_u64(&result))
            .ok_or_else(|| LedgerError::Malformed("missing latest ledger sequence".to_string()))
    }

    /// Requests emitted after `cursor`, plus the ledger the scan stopped at.
    async fn requests_after(&self, cursor: u64) -> Result<(Vec<FlightRequest>, u64), LedgerError> {
        let latest = self.latest_ledger().await?;
        let from_ledger = cursor.saturating_add(1);
        if from_ledger > latest {
            return Ok((Vec::new(), cursor));
        }

        let to_ledger = latest.min(from_ledger + MAX_LEDGER_RANGE);
        let result = self
            .call(
                "oracle_getEvents",
                json!({
                    "startLedger": from_ledger,
                    "endLedger": to_ledger,
                    "eventTypes": [ORACLE_REQUEST_EVENT],
                }),
            )
            .await?;

        let requests = result
            .get("events")
            .and_then(Value::as_array)
            .map(|events| events.iter().filter_map(parse_request_event).collect())
            .unwrap_or_default();

        Ok((requests, to_ledger))
    }

    async fn poll_requests(
        self,
        mut cursor: u64,
        tx: mpsc::UnboundedSender<Result<FlightRequest, LedgerError>>,
    ) {
        debug!(cursor, "oracle request polling started");

        while !tx.is_closed() {
            match self.requests_after(cursor).await {
                Ok((requests, scanned_to)) => {
                    for request in requests {
                        if tx.send(Ok(request)).is_err() {
                            return;
                        }
                    }
                    cursor = scanned_to;
                }
                Err(err) => {
                    warn!(error = %err, cursor, "oracle request poll failed");
                    if tx.send(Err(err)).is_err() {
                        return;
                    }
                }
            }

            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn accounts(&self) -> Result<Vec<Identity>, LedgerError> {
        let result = self.call("oracle_accounts", json!({})).await?;
        let accounts = result
            .as_array()
            .ok_or_else(|| LedgerError::Malformed("accounts must be an array".to_string()))?;

        accounts
            .iter()
            .map(|account| {
                account
                    .as_str()
                    .map(Identity::new)
                    .ok_or_else(|| LedgerError::Malformed(format!("invalid account {account}")))
            })
            .collect()
    }

    async fn fetch_registration_fee(&self) -> Result<u128, LedgerError> {
        let result = self.call("oracle_registrationFee", json!({})).await?;
        parse_amount(&result)
            .ok_or_else(|| LedgerError::Malformed(format!("invalid registration fee {result}")))
    }

    async fn register_oracle(&self, identity: &Identity, fee: u128) -> Result<(), LedgerError> {
        self.call(
            "oracle_register",
            json!({ "from": identity, "value": fee.to_string() }),
        )
        .await
        .map(|_| ())
    }

    async fn get_assigned_indexes(&self, identity: &Identity) -> Result<OracleIndexes, LedgerError> {
        let result = self
            .call("oracle_getMyIndexes", json!({ "from": identity }))
            .await?;
        parse_indexes(&result)
            .ok_or_else(|| LedgerError::Malformed(format!("invalid index triple {result}")))
    }

    async fn subscribe_oracle_requests(&self) -> Result<RequestSubscription, LedgerError> {
        let head = self.latest_ledger().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.clone().poll_requests(head, tx));
        Ok(RequestSubscription::with_task(rx, task))
    }

    async fn submit_oracle_response(
        &self,
        identity: &Identity,
        request: &FlightRequest,
        status: FlightStatus,
    ) -> Result<SubmissionOutcome, LedgerError> {
        let params = json!({
            "from": identity,
            "index": request.request_index,
            "airline": request.airline,
            "flight": request.flight,
            "timestamp": request.timestamp,
            "statusCode": status.code(),
        });

        match self.rpc_call("oracle_submitResponse", params).await {
            Ok(_) => Ok(SubmissionOutcome::Accepted),
            Err(CallError::Rpc { code: ERR_INDEX_MISMATCH, .. }) => {
                Ok(SubmissionOutcome::Rejected(RejectReason::IndexMismatch))
            }
            Err(CallError::Rpc { code: ERR_REQUEST_CLOSED, .. }) => {
                Ok(SubmissionOutcome::Rejected(RejectReason::RequestClosed))
            }
            Err(CallError::Rpc { code: ERR_NOT_REGISTERED, .. }) => {
                Ok(SubmissionOutcome::Rejected(RejectReason::NotRegistered))
            }
            Err(err) => Err(err.into_ledger_error()),
        }
    }

    async fn fetch_flight_status(
        &self,
        caller: &Identity,
        airline: &Identity,
        flight: &str,
        timestamp: u64,
    ) -> Result<u8, LedgerError> {
        let result = self
            .call(
                "oracle_fetchFlightStatus",
                json!({
                    "from": caller,
                    "airline": airline,
                    "flight": flight,
                    "timestamp": timestamp,
                }),
            )
            .await?;

        result
            .get("index")
            .and_then(parse_u64)
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| LedgerError::Malformed(format!("invalid request index in {result}")))
    }
}

fn parse_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Amounts are sent as decimal strings; small ones may arrive as numbers.
fn parse_amount(value: &Value) -> Option<u128> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(u128::from),
        _ => None,
    }
}

fn parse_indexes(value: &Value) -> Option<OracleIndexes> {
    let items = value.as_array()?;
    if items.len() != INDEXES_PER_ORACLE {
        return None;
    }

    let mut indexes = [0u8; INDEXES_PER_ORACLE];
    for (slot, item) in indexes.iter_mut().zip(items) {
        *slot = u8::try_from(parse_u64(item)?).ok()?;
    }
    Some(indexes)
}

fn parse_request_event(raw: &Value) -> Option<FlightRequest> {
    let event_name = raw
        .get("type")
        .or_else(|| raw.get("event"))
        .and_then(Value::as_str)?;
    if event_name != ORACLE_REQUEST_EVENT {
        return None;
    }

    let values = raw.get("returnValues").unwrap_or(raw);
    Some(FlightRequest {
        request_index: u8::try_from(values.get("index").and_then(parse_u64)?).ok()?,
        airline: Identity::new(values.get("airline").and_then(Value::as_str)?),
        flight: values.get("flight").and_then(Value::as_str)?.to_string(),
        timestamp: values.get("timestamp").and_then(parse_u64)?,
    })
}
