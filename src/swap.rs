//! Swap Aggregator Client
//!
//! Two-step route API: `GET {base}/{chain}/api/v1/routes` quotes a route and
//! returns an opaque `routeSummary`, `POST {base}/{chain}/api/v1/route/build`
//! turns that summary into router calldata for a given sender.

use ethereum_types::{Address, U256};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::chains::{format_address, is_native, parse_address};
use crate::error::{FlowError, FlowResult};

/// Parameters for a route quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub chain_id: u64,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub slippage_bps: u32,
    /// Unix seconds
    pub deadline: u64,
}

/// A quoted route, not yet executable.
#[derive(Debug, Clone)]
pub struct RouteQuote {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    pub amount_out_usd: Option<f64>,
    pub deadline: u64,
    /// Passed back verbatim to the build endpoint
    pub route_summary: serde_json::Value,
    pub fetched_at: Instant,
}

/// A built route: router address plus calldata for the sender.
#[derive(Debug, Clone)]
pub struct SwapRoute {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    pub router_address: Address,
    pub call_data: Vec<u8>,
    pub route_summary: serde_json::Value,
    /// When the underlying quote was fetched
    pub fetched_at: Instant,
}

impl SwapRoute {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Whether the swap spends the native coin (sent as tx value).
    pub fn is_native_in(&self) -> bool {
        is_native(&self.token_in)
    }
}

/// Route quoting and building.
#[allow(async_fn_in_trait)]
pub trait SwapAggregator {
    async fn quote_route(&self, request: &RouteRequest) -> FlowResult<RouteQuote>;

    async fn build_route(
        &self,
        quote: &RouteQuote,
        sender: Address,
        slippage_bps: u32,
    ) -> FlowResult<SwapRoute>;
}

/// Aggregator response envelope
#[derive(Debug, Deserialize)]
struct AggregatorResponse<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutesData {
    route_summary: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildRequest<'a> {
    route_summary: &'a serde_json::Value,
    sender: String,
    recipient: String,
    slippage_tolerance: u32,
    deadline: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildData {
    amount_in: String,
    amount_out: String,
    data: String,
    router_address: String,
}

/// HTTP client for the swap aggregator of one chain
pub struct AggregatorClient {
    /// HTTP client
    client: Client,
    /// Aggregator base URL
    base_url: String,
    /// Chain path segment (e.g. "ethereum", "base")
    chain_name: String,
}

impl AggregatorClient {
    /// Creates a new aggregator client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Aggregator base URL
    /// * `chain_name` - Chain path segment used by the aggregator
    pub fn new(base_url: &str, chain_name: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_name: chain_name.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/api/v1/{}", self.base_url, self.chain_name, path)
    }
}

/// Unwraps the `{code, message, data}` envelope.
fn unwrap_envelope<T>(response: AggregatorResponse<T>, what: &str) -> FlowResult<T> {
    if response.code != 0 {
        return Err(FlowError::RouteUnavailable(format!(
            "{} failed with code {}: {}",
            what,
            response.code,
            response.message.unwrap_or_default()
        )));
    }
    response
        .data
        .ok_or_else(|| FlowError::RouteUnavailable(format!("{} returned no data", what)))
}

fn parse_amount(value: &serde_json::Value, field: &str) -> FlowResult<U256> {
    let raw = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => {
            return Err(FlowError::RouteUnavailable(format!("route is missing {}", field)));
        }
    };
    U256::from_dec_str(&raw)
        .map_err(|_| FlowError::RouteUnavailable(format!("invalid {} '{}'", field, raw)))
}

fn parse_usd(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

impl SwapAggregator for AggregatorClient {
    async fn quote_route(&self, request: &RouteRequest) -> FlowResult<RouteQuote> {
        let url = self.url("routes");
        let params = [
            ("tokenIn", format_address(&request.token_in)),
            ("tokenOut", format_address(&request.token_out)),
            ("amountIn", request.amount_in.to_string()),
            ("to", format_address(&Address::zero())),
            ("slippage", request.slippage_bps.to_string()),
            ("deadline", request.deadline.to_string()),
            ("chainId", request.chain_id.to_string()),
        ];

        debug!("Quoting route {} -> {} for {}", params[0].1, params[1].1, request.amount_in);

        let response: AggregatorResponse<RoutesData> = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| FlowError::RouteUnavailable(format!("route request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| FlowError::RouteUnavailable(format!("invalid route response: {}", e)))?;

        let data = unwrap_envelope(response, "route quote")?;
        let amount_out = parse_amount(&data.route_summary["amountOut"], "amountOut")?;
        let amount_out_usd = parse_usd(data.route_summary.get("amountOutUsd"));

        info!(
            "Route quoted: {} in -> {} out (usd {:?})",
            request.amount_in, amount_out, amount_out_usd
        );

        Ok(RouteQuote {
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in: request.amount_in,
            amount_out,
            amount_out_usd,
            deadline: request.deadline,
            route_summary: data.route_summary,
            fetched_at: Instant::now(),
        })
    }

    async fn build_route(
        &self,
        quote: &RouteQuote,
        sender: Address,
        slippage_bps: u32,
    ) -> FlowResult<SwapRoute> {
        let body = BuildRequest {
            route_summary: &quote.route_summary,
            sender: format_address(&sender),
            recipient: format_address(&sender),
            slippage_tolerance: slippage_bps,
            deadline: quote.deadline,
        };

        let response: AggregatorResponse<BuildData> = self
            .client
            .post(self.url("route/build"))
            .json(&body)
            .send()
            .await
            .map_err(|e| FlowError::RouteUnavailable(format!("route build failed: {}", e)))?
            .json()
            .await
            .map_err(|e| FlowError::RouteUnavailable(format!("invalid build response: {}", e)))?;

        let data = unwrap_envelope(response, "route build")?;
        let router_address = parse_address(&data.router_address)
            .map_err(|e| FlowError::RouteUnavailable(format!("invalid routerAddress: {}", e)))?;
        let call_data = crate::chains::abi::decode_hex(&data.data)
            .map_err(|e| FlowError::RouteUnavailable(format!("invalid calldata: {}", e)))?;
        let amount_in = parse_amount(&serde_json::Value::String(data.amount_in), "amountIn")?;
        let amount_out = parse_amount(&serde_json::Value::String(data.amount_out), "amountOut")?;

        info!("Route built: router {}", format_address(&router_address));

        Ok(SwapRoute {
            token_in: quote.token_in,
            token_out: quote.token_out,
            amount_in,
            amount_out,
            router_address,
            call_data,
            route_summary: quote.route_summary.clone(),
            fetched_at: quote.fetched_at,
        })
    }
}
