// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::circuit::{CircuitBreakerConfig, CircuitBreakers};
use crate::error::ApiError;
use crate::metrics;
use crate::model::*;
use crate::rate_limit::PlayerRateLimiter;
use crate::transport::{ApiRequest, ApiTransport, HttpTransport};
use flotilla_common::clock::Clock;
use flotilla_common::model::ship::FlightMode;
use flotilla_common::model::{PlayerId, PlayerToken, ShipSymbol, SystemSymbol, WaypointSymbol};
use flotilla_common::retries::RetryConfig;
use flotilla_common::SafeDisplay;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiClientConfig {
    pub base_url: String,
    /// Steady-state requests per second, per player.
    pub rate_limit: f64,
    /// Token bucket capacity, per player.
    pub burst: u32,
    /// How long a request may wait for a rate-limit token.
    #[serde(with = "humantime_serde")]
    pub token_deadline: Duration,
    pub retries: RetryConfig,
    pub circuit: CircuitBreakerConfig,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.spacetraders.io/v2".to_string(),
            rate_limit: 2.0,
            burst: 2,
            token_deadline: Duration::from_secs(30),
            retries: RetryConfig::default(),
            circuit: CircuitBreakerConfig::default(),
        }
    }
}

impl SafeDisplay for ApiClientConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "base url: {}", self.base_url);
        let _ = writeln!(
            &mut result,
            "rate limit: {}/s (burst {})",
            self.rate_limit, self.burst
        );
        let _ = writeln!(&mut result, "retries: {}", self.retries.max_attempts);
        let _ = writeln!(
            &mut result,
            "circuit: {} failures, {:?} cooldown",
            self.circuit.threshold, self.circuit.cooldown
        );
        result
    }
}

/// Rate-limited, retrying, circuit-broken client for the remote universe
/// API. This is the only way any component talks to the remote HTTP API.
pub struct ApiClient {
    transport: Arc<dyn ApiTransport>,
    limiter: PlayerRateLimiter,
    breakers: CircuitBreakers,
    retries: RetryConfig,
    token_deadline: Duration,
    clock: Arc<dyn Clock>,
}

impl ApiClient {
    pub fn new(config: &ApiClientConfig, clock: Arc<dyn Clock>) -> Result<Self, ApiError> {
        let transport = Arc::new(HttpTransport::new(&config.base_url)?);
        Ok(Self::with_transport(transport, config, clock))
    }

    pub fn with_transport(
        transport: Arc<dyn ApiTransport>,
        config: &ApiClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            limiter: PlayerRateLimiter::new(clock.clone(), config.rate_limit, config.burst),
            breakers: CircuitBreakers::new(clock.clone(), config.circuit.clone()),
            retries: config.retries.clone(),
            token_deadline: config.token_deadline,
            clock,
        }
    }

    /// One logical call: circuit check, then up to `retries.max_attempts`
    /// retried attempts, each gated on the player's token bucket. A surfaced
    /// transient failure counts against the endpoint family's breaker.
    async fn call_value(
        &self,
        player_id: PlayerId,
        family: &'static str,
        request: ApiRequest,
    ) -> Result<serde_json::Value, ApiError> {
        self.breakers.try_acquire(player_id, family)?;

        let result = self.attempts(player_id, family, request).await;
        match &result {
            Ok(_) => {
                self.breakers.record_success(player_id, family);
                metrics::record_api_call(family, "ok");
            }
            Err(error) => {
                if error.trips_breaker() {
                    self.breakers.record_failure(player_id, family);
                }
                metrics::record_api_call(family, "error");
            }
        }
        result
    }

    async fn attempts(
        &self,
        player_id: PlayerId,
        family: &'static str,
        request: ApiRequest,
    ) -> Result<serde_json::Value, ApiError> {
        let bucket = self.limiter.bucket(player_id);
        let mut attempt: u32 = 0;
        loop {
            bucket.acquire(self.token_deadline).await?;
            match self.transport.send(request.clone()).await {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    let retriable = failure.error.is_retriable();
                    if !retriable || attempt >= self.retries.max_attempts {
                        if retriable {
                            warn!(
                                %player_id,
                                family,
                                attempts = attempt + 1,
                                error = %failure.error,
                                "retry budget exhausted"
                            );
                        }
                        return Err(failure.error);
                    }
                    let mut delay = self.retries.jittered_delay_for_attempt(attempt);
                    if let Some(hint) = failure.retry_after {
                        delay = delay.max(hint);
                    }
                    debug!(
                        %player_id,
                        family,
                        attempt,
                        ?delay,
                        error = %failure.error,
                        "retrying after transient failure"
                    );
                    metrics::record_api_retry(family);
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        player_id: PlayerId,
        family: &'static str,
        request: ApiRequest,
    ) -> Result<T, ApiError> {
        let value = self.call_value(player_id, family, request).await?;
        let data = match value {
            serde_json::Value::Object(mut object) => match object.remove("data") {
                Some(data) => data,
                None => serde_json::Value::Object(object),
            },
            other => other,
        };
        serde_json::from_value(data).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn call_paged<T: DeserializeOwned>(
        &self,
        player_id: PlayerId,
        family: &'static str,
        token: &PlayerToken,
        path: &str,
    ) -> Result<Vec<T>, ApiError> {
        const PAGE_LIMIT: u32 = 20;
        let mut results = Vec::new();
        let mut page = 1;
        loop {
            let request = ApiRequest::get(format!("{path}?page={page}&limit={PAGE_LIMIT}"))
                .with_token(token.secret());
            let value = self.call_value(player_id, family, request).await?;
            let parsed: Paged<T> =
                serde_json::from_value(value).map_err(|err| ApiError::Decode(err.to_string()))?;
            let total = parsed.meta.total;
            results.extend(parsed.data);
            if results.len() as u32 >= total {
                return Ok(results);
            }
            page += 1;
        }
    }

    // -- agents ------------------------------------------------------------

    pub async fn register_agent(
        &self,
        player_id: PlayerId,
        request: &RegistrationRequest,
    ) -> Result<RegistrationData, ApiError> {
        self.call(
            player_id,
            "agents",
            ApiRequest::post("register")
                .with_body(serde_json::to_value(request).expect("registration request serializes")),
        )
        .await
    }

    pub async fn get_agent(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
    ) -> Result<AgentDto, ApiError> {
        self.call(
            player_id,
            "agents",
            ApiRequest::get("my/agent").with_token(token.secret()),
        )
        .await
    }

    // -- systems and waypoints ---------------------------------------------

    pub async fn list_waypoints(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        system: &SystemSymbol,
    ) -> Result<Vec<WaypointDto>, ApiError> {
        self.call_paged(
            player_id,
            "systems",
            token,
            &format!("systems/{system}/waypoints"),
        )
        .await
    }

    // -- ships --------------------------------------------------------------

    pub async fn list_ships(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
    ) -> Result<Vec<ShipDto>, ApiError> {
        self.call_paged(player_id, "ships", token, "my/ships").await
    }

    pub async fn get_ship(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
    ) -> Result<ShipDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::get(format!("my/ships/{ship}")).with_token(token.secret()),
        )
        .await
    }

    pub async fn orbit_ship(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
    ) -> Result<NavResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post(format!("my/ships/{ship}/orbit")).with_token(token.secret()),
        )
        .await
    }

    pub async fn dock_ship(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
    ) -> Result<NavResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post(format!("my/ships/{ship}/dock")).with_token(token.secret()),
        )
        .await
    }

    pub async fn navigate_ship(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
        to: &WaypointSymbol,
    ) -> Result<NavigateResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post(format!("my/ships/{ship}/navigate"))
                .with_token(token.secret())
                .with_body(serde_json::json!({ "waypointSymbol": to })),
        )
        .await
    }

    pub async fn refuel_ship(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
    ) -> Result<RefuelResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post(format!("my/ships/{ship}/refuel")).with_token(token.secret()),
        )
        .await
    }

    pub async fn set_flight_mode(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
        mode: FlightMode,
    ) -> Result<ShipNavDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::patch(format!("my/ships/{ship}/nav"))
                .with_token(token.secret())
                .with_body(serde_json::json!({ "flightMode": mode })),
        )
        .await
    }

    pub async fn extract_resources(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
    ) -> Result<ExtractionResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post(format!("my/ships/{ship}/extract")).with_token(token.secret()),
        )
        .await
    }

    pub async fn transfer_cargo(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        from: &ShipSymbol,
        to: &ShipSymbol,
        trade_symbol: &str,
        units: u32,
    ) -> Result<TransferResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post(format!("my/ships/{from}/transfer"))
                .with_token(token.secret())
                .with_body(serde_json::json!({
                    "shipSymbol": to,
                    "tradeSymbol": trade_symbol,
                    "units": units,
                })),
        )
        .await
    }

    pub async fn purchase_ship(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship_type: &str,
        at: &WaypointSymbol,
    ) -> Result<PurchaseShipResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post("my/ships")
                .with_token(token.secret())
                .with_body(serde_json::json!({
                    "shipType": ship_type,
                    "waypointSymbol": at,
                })),
        )
        .await
    }

    pub async fn purchase_cargo(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
        trade_symbol: &str,
        units: u32,
    ) -> Result<TradeResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post(format!("my/ships/{ship}/purchase"))
                .with_token(token.secret())
                .with_body(serde_json::json!({ "symbol": trade_symbol, "units": units })),
        )
        .await
    }

    pub async fn sell_cargo(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
        trade_symbol: &str,
        units: u32,
    ) -> Result<TradeResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post(format!("my/ships/{ship}/sell"))
                .with_token(token.secret())
                .with_body(serde_json::json!({ "symbol": trade_symbol, "units": units })),
        )
        .await
    }

    pub async fn jettison_cargo(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
        trade_symbol: &str,
        units: u32,
    ) -> Result<TransferResultDto, ApiError> {
        self.call(
            player_id,
            "ships",
            ApiRequest::post(format!("my/ships/{ship}/jettison"))
                .with_token(token.secret())
                .with_body(serde_json::json!({ "symbol": trade_symbol, "units": units })),
        )
        .await
    }

    // -- markets and shipyards ----------------------------------------------

    pub async fn get_market(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        waypoint: &WaypointSymbol,
    ) -> Result<MarketDto, ApiError> {
        let system = waypoint.system_symbol();
        self.call(
            player_id,
            "markets",
            ApiRequest::get(format!("systems/{system}/waypoints/{waypoint}/market"))
                .with_token(token.secret()),
        )
        .await
    }

    pub async fn get_shipyard(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        waypoint: &WaypointSymbol,
    ) -> Result<ShipyardDto, ApiError> {
        let system = waypoint.system_symbol();
        self.call(
            player_id,
            "shipyards",
            ApiRequest::get(format!("systems/{system}/waypoints/{waypoint}/shipyard"))
                .with_token(token.secret()),
        )
        .await
    }

    // -- contracts -----------------------------------------------------------

    pub async fn list_contracts(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
    ) -> Result<Vec<ContractDto>, ApiError> {
        self.call_paged(player_id, "contracts", token, "my/contracts")
            .await
    }

    pub async fn negotiate_contract(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        ship: &ShipSymbol,
    ) -> Result<ContractNegotiationDto, ApiError> {
        self.call(
            player_id,
            "contracts",
            ApiRequest::post(format!("my/ships/{ship}/negotiate/contract"))
                .with_token(token.secret()),
        )
        .await
    }

    pub async fn accept_contract(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        contract_id: &str,
    ) -> Result<ContractMutationDto, ApiError> {
        self.call(
            player_id,
            "contracts",
            ApiRequest::post(format!("my/contracts/{contract_id}/accept"))
                .with_token(token.secret()),
        )
        .await
    }

    pub async fn deliver_contract(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        contract_id: &str,
        ship: &ShipSymbol,
        trade_symbol: &str,
        units: u32,
    ) -> Result<DeliverResultDto, ApiError> {
        self.call(
            player_id,
            "contracts",
            ApiRequest::post(format!("my/contracts/{contract_id}/deliver"))
                .with_token(token.secret())
                .with_body(serde_json::json!({
                    "shipSymbol": ship,
                    "tradeSymbol": trade_symbol,
                    "units": units,
                })),
        )
        .await
    }

    pub async fn fulfill_contract(
        &self,
        player_id: PlayerId,
        token: &PlayerToken,
        contract_id: &str,
    ) -> Result<ContractMutationDto, ApiError> {
        self.call(
            player_id,
            "contracts",
            ApiRequest::post(format!("my/contracts/{contract_id}/fulfill"))
                .with_token(token.secret()),
        )
        .await
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractNegotiationDto {
    pub contract: ContractDto,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractMutationDto {
    pub contract: ContractDto,
    #[serde(default)]
    pub agent: Option<AgentDto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use flotilla_common::clock::TestClock;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use test_r::test;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<serde_json::Value, TransportError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(
            responses: impl IntoIterator<Item = Result<serde_json::Value, TransportError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().collect()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ApiTransport for ScriptedTransport {
        async fn send(
            &self,
            _request: ApiRequest,
        ) -> Result<serde_json::Value, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(TransportError::from(ApiError::Network(
                        "script exhausted".to_string(),
                    )))
                })
        }
    }

    fn ship_json() -> serde_json::Value {
        serde_json::json!({
            "data": {
                "symbol": "FLEET-1",
                "nav": {
                    "status": "IN_ORBIT",
                    "waypointSymbol": "X1-AB12-C34",
                    "flightMode": "CRUISE"
                },
                "fuel": { "current": 400, "capacity": 400 },
                "cargo": { "capacity": 40, "units": 0, "inventory": [] },
                "engine": { "speed": 30 }
            }
        })
    }

    fn error_503() -> Result<serde_json::Value, TransportError> {
        Err(TransportError::from(ApiError::ServerError {
            status: 503,
            message: "unavailable".to_string(),
        }))
    }

    fn config_without_jitter() -> ApiClientConfig {
        ApiClientConfig {
            retries: RetryConfig {
                jitter: 0.0,
                ..RetryConfig::default()
            },
            // effectively never gates in these tests
            rate_limit: 1000.0,
            burst: 100,
            ..ApiClientConfig::default()
        }
    }

    async fn drive_to_completion<T: Send + 'static>(
        clock: &TestClock,
        handle: tokio::task::JoinHandle<T>,
    ) -> T {
        loop {
            if handle.is_finished() {
                return handle.await.unwrap();
            }
            if clock.sleeper_count() > 0 {
                clock.advance(Duration::from_secs(1));
            }
            tokio::task::yield_now().await;
        }
    }

    fn client(transport: Arc<ScriptedTransport>, clock: &TestClock) -> Arc<ApiClient> {
        Arc::new(ApiClient::with_transport(
            transport,
            &config_without_jitter(),
            Arc::new(clock.clone()),
        ))
    }

    #[test]
    async fn transient_failures_are_retried_until_success() {
        let clock = TestClock::new(start());
        let transport = ScriptedTransport::new([error_503(), error_503(), Ok(ship_json())]);
        let client = client(transport.clone(), &clock);
        let player = PlayerId::new();
        let token = PlayerToken("t".to_string());

        let task = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .get_ship(player, &token, &ShipSymbol("FLEET-1".to_string()))
                    .await
            })
        };

        let ship = drive_to_completion(&clock, task).await.unwrap();
        assert_eq!(ship.symbol, "FLEET-1");
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    async fn retry_budget_exhaustion_surfaces_the_error() {
        let clock = TestClock::new(start());
        let transport = ScriptedTransport::new((0..6).map(|_| error_503()));
        let client = client(transport.clone(), &clock);
        let player = PlayerId::new();
        let token = PlayerToken("t".to_string());

        let task = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .get_ship(player, &token, &ShipSymbol("FLEET-1".to_string()))
                    .await
            })
        };

        let result = drive_to_completion(&clock, task).await;
        assert!(matches!(result, Err(ApiError::ServerError { status: 503, .. })));
        // initial attempt + 5 retries
        assert_eq!(transport.calls(), 6);
    }

    #[test]
    async fn non_retriable_errors_surface_immediately() {
        let clock = TestClock::new(start());
        let transport = ScriptedTransport::new([Err(TransportError::from(ApiError::NotFound(
            "no such ship".to_string(),
        )))]);
        let client = client(transport.clone(), &clock);
        let player = PlayerId::new();
        let token = PlayerToken("t".to_string());

        let result = client
            .get_ship(player, &token, &ShipSymbol("GHOST".to_string()))
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    async fn retry_after_hint_is_a_floor_on_the_delay() {
        let clock = TestClock::new(start());
        let transport = ScriptedTransport::new([
            Err(TransportError {
                error: ApiError::RateLimited("slow down".to_string()),
                retry_after: Some(Duration::from_secs(5)),
            }),
            Ok(ship_json()),
        ]);
        let client = client(transport.clone(), &clock);
        let player = PlayerId::new();
        let token = PlayerToken("t".to_string());

        let task = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .get_ship(player, &token, &ShipSymbol("FLEET-1".to_string()))
                    .await
            })
        };

        clock.wait_for_sleepers(1).await;
        // the default backoff for attempt 0 is 1s, but the hint says 5s
        clock.advance(Duration::from_secs(1));
        tokio::task::yield_now().await;
        assert_eq!(transport.calls(), 1);

        clock.advance(Duration::from_secs(4));
        let result = drive_to_completion(&clock, task).await;
        assert!(result.is_ok());
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    async fn breaker_short_circuits_after_consecutive_failed_calls() {
        let clock = TestClock::new(start());
        // 5 failing calls (no retries to keep the script short), then a good one
        let config = ApiClientConfig {
            retries: RetryConfig {
                max_attempts: 0,
                jitter: 0.0,
                ..RetryConfig::default()
            },
            rate_limit: 1000.0,
            burst: 100,
            ..ApiClientConfig::default()
        };
        let transport =
            ScriptedTransport::new((0..5).map(|_| error_503()).chain([Ok(ship_json())]));
        let client = Arc::new(ApiClient::with_transport(
            transport.clone(),
            &config,
            Arc::new(clock.clone()),
        ));
        let player = PlayerId::new();
        let token = PlayerToken("t".to_string());
        let ship = ShipSymbol("FLEET-1".to_string());

        for _ in 0..5 {
            let result = client.get_ship(player, &token, &ship).await;
            assert!(matches!(result, Err(ApiError::ServerError { .. })));
        }
        assert_eq!(transport.calls(), 5);

        // breaker is now open: no transport hit
        let result = client.get_ship(player, &token, &ship).await;
        assert!(matches!(result, Err(ApiError::OpenCircuit(_))));
        assert_eq!(transport.calls(), 5);

        // after the cooldown one probe goes through and closes the breaker
        clock.advance(Duration::from_secs(60));
        let result = client.get_ship(player, &token, &ship).await;
        assert!(result.is_ok());
        assert_eq!(transport.calls(), 6);
    }

    #[test]
    async fn data_envelope_is_unwrapped() {
        let clock = TestClock::new(start());
        let transport = ScriptedTransport::new([Ok(ship_json())]);
        let client = client(transport, &clock);
        let player = PlayerId::new();
        let token = PlayerToken("t".to_string());

        let ship = client
            .get_ship(player, &token, &ShipSymbol("FLEET-1".to_string()))
            .await
            .unwrap();
        assert_eq!(ship.nav.waypoint_symbol, "X1-AB12-C34");
    }
}
