//! Polymarket CLOB (Central Limit Order Book) client for order execution.
//!
//! The CLOB is Polymarket's off-chain order matching engine that settles on Polygon.
//! Instructions are placed as fill-or-kill orders priced off the top of the
//! book, signed with EIP-712 and submitted with L2 (HMAC) request headers.

use alloy_primitives::{keccak256, Address, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::ExecutionError;
use crate::models::{TradeInstruction, TradeSide};
use crate::traits::{OrderExecutor, OrderReceipt};

/// CLOB API base URL
pub const CLOB_URL: &str = "https://clob.polymarket.com";

/// Polymarket CTF Exchange contract on Polygon
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

/// Price allowance over the best quote for fill-or-kill orders (0.5%)
const SLIPPAGE: Decimal = dec!(0.005);

/// Seconds a signed order stays valid
const ORDER_TTL_SECS: i64 = 3600;

const ORDER_TYPE_STRING: &[u8] = b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)";
const DOMAIN_TYPE_STRING: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Signature type for CLOB orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    /// EOA signature
    Eoa = 0,
}

/// API credentials for the CLOB.
#[derive(Clone)]
pub struct ClobCredentials {
    pub private_key: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
    /// Polygon chain ID (137 for mainnet, 80002 for Amoy testnet)
    pub chain_id: u64,
}

impl ClobCredentials {
    /// Read credentials from environment variables:
    /// - POLYMARKET_PRIVATE_KEY
    /// - POLYMARKET_API_KEY
    /// - POLYMARKET_API_SECRET
    /// - POLYMARKET_API_PASSPHRASE
    /// - POLYMARKET_CHAIN_ID (defaults to 137)
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} not set", name))
        };

        Ok(Self {
            private_key: var("POLYMARKET_PRIVATE_KEY")?,
            api_key: var("POLYMARKET_API_KEY")?,
            api_secret: var("POLYMARKET_API_SECRET")?,
            api_passphrase: var("POLYMARKET_API_PASSPHRASE")?,
            chain_id: std::env::var("POLYMARKET_CHAIN_ID")
                .unwrap_or_else(|_| "137".to_string())
                .parse()
                .context("Invalid POLYMARKET_CHAIN_ID")?,
        })
    }
}

/// Order book entry
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub size: String,
}

/// Order book response
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Best price we can take on `side`: lowest ask to buy, highest bid to sell.
    pub fn best_price(&self, side: TradeSide) -> Option<Decimal> {
        let levels = match side {
            TradeSide::Buy => &self.asks,
            TradeSide::Sell => &self.bids,
        };
        let prices = levels.iter().filter_map(|l| Decimal::from_str(&l.price).ok());
        match side {
            TradeSide::Buy => prices.min(),
            TradeSide::Sell => prices.max(),
        }
    }
}

/// EIP-712 order struct, as signed.
#[derive(Debug, Clone)]
pub struct Order {
    pub salt: U256,
    pub maker: Address,
    pub signer: Address,
    pub taker: Address,
    pub token_id: U256,
    pub maker_amount: U256,
    pub taker_amount: U256,
    pub expiration: U256,
    pub nonce: U256,
    pub fee_rate_bps: U256,
    pub side: TradeSide,
    pub signature_type: SignatureType,
}

impl Order {
    /// EIP-712 struct hash.
    pub fn struct_hash(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(13 * 32);
        encoded.extend_from_slice(keccak256(ORDER_TYPE_STRING).as_slice());
        encoded.extend_from_slice(&self.salt.to_be_bytes::<32>());
        encoded.extend_from_slice(&encode_address(self.maker));
        encoded.extend_from_slice(&encode_address(self.signer));
        encoded.extend_from_slice(&encode_address(self.taker));
        encoded.extend_from_slice(&self.token_id.to_be_bytes::<32>());
        encoded.extend_from_slice(&self.maker_amount.to_be_bytes::<32>());
        encoded.extend_from_slice(&self.taker_amount.to_be_bytes::<32>());
        encoded.extend_from_slice(&self.expiration.to_be_bytes::<32>());
        encoded.extend_from_slice(&self.nonce.to_be_bytes::<32>());
        encoded.extend_from_slice(&self.fee_rate_bps.to_be_bytes::<32>());
        encoded.extend_from_slice(&encode_uint8(side_code(self.side)));
        encoded.extend_from_slice(&encode_uint8(self.signature_type as u8));
        keccak256(&encoded).0
    }
}

/// Signed order ready for submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: String,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub side: TradeSide,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Order submission request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order: SignedOrder,
    pub owner: String,
    pub order_type: &'static str,
}

/// Response from order placement
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(rename = "orderID", alias = "orderId")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    pub status: Option<String>,
    #[serde(default)]
    pub transactions_hashes: Vec<String>,
}

/// CLOB API client for executing trades on Polymarket.
pub struct ClobClient {
    http: Client,
    base_url: String,
    signer: PrivateKeySigner,
    credentials: ClobCredentials,
}

impl ClobClient {
    /// Create a new CLOB client.
    pub fn new(credentials: ClobCredentials) -> Result<Self> {
        let pk = credentials
            .private_key
            .strip_prefix("0x")
            .unwrap_or(&credentials.private_key);
        let signer = PrivateKeySigner::from_str(pk).context("Invalid private key")?;

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: CLOB_URL.to_string(),
            signer,
            credentials,
        })
    }

    /// Create from `POLYMARKET_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClobCredentials::from_env()?)
    }

    /// Get the wallet address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get order book for a token.
    pub async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, ExecutionError> {
        let url = format!("{}/book?token_id={}", self.base_url, token_id);
        let resp = self.http.get(&url).send().await.map_err(venue)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ExecutionError::Venue(format!(
                "Failed to get order book: {} - {}",
                status, text
            )));
        }

        resp.json().await.map_err(venue)
    }

    /// Place a fill-or-kill order for `instruction`, priced off the best quote.
    pub async fn market_order(
        &self,
        instruction: &TradeInstruction,
    ) -> Result<OrderResponse, ExecutionError> {
        if instruction.quantity <= Decimal::ZERO {
            return Err(ExecutionError::InvalidQuantity(instruction.quantity));
        }

        let book = self.get_order_book(&instruction.asset_id).await?;
        let best = book
            .best_price(instruction.side)
            .ok_or_else(|| ExecutionError::NoLiquidity {
                asset_id: instruction.asset_id.clone(),
                side: instruction.side.as_str(),
            })?;
        let price = limit_price(instruction.side, best);

        debug!(
            asset = %instruction.asset_id,
            side = %instruction.side,
            best = %best,
            price = %price,
            "Pricing market order"
        );

        let order = self
            .build_order(instruction, price)
            .map_err(|e| ExecutionError::Venue(e.to_string()))?;
        let signed = self
            .sign_order(order)
            .await
            .map_err(|e| ExecutionError::Venue(e.to_string()))?;

        let payload = OrderPayload {
            order: signed,
            owner: self.credentials.api_key.clone(),
            order_type: "FOK",
        };
        let body = serde_json::to_string(&payload).map_err(|e| ExecutionError::Venue(e.to_string()))?;
        let headers = self
            .l2_headers("POST", "/order", Some(&body))
            .map_err(|e| ExecutionError::Venue(e.to_string()))?;

        let url = format!("{}/order", self.base_url);
        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(venue)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ExecutionError::Rejected(format!("{} - {}", status, text)));
        }

        let response: OrderResponse = resp.json().await.map_err(venue)?;
        if !response.success {
            return Err(ExecutionError::Rejected(response.error_msg));
        }

        Ok(response)
    }

    fn build_order(&self, instruction: &TradeInstruction, price: Decimal) -> Result<Order> {
        let (maker_amount, taker_amount) = order_amounts(instruction.side, instruction.quantity, price)
            .with_context(|| format!("Order size {} out of range", instruction.quantity))?;
        let expiration = Utc::now().timestamp() + ORDER_TTL_SECS;

        Ok(Order {
            salt: U256::from(uuid::Uuid::new_v4().as_u128()),
            maker: self.address(),
            signer: self.address(),
            taker: Address::ZERO,
            token_id: U256::from_str(&instruction.asset_id)
                .with_context(|| format!("Invalid token id {}", instruction.asset_id))?,
            maker_amount: U256::from_str(&maker_amount)?,
            taker_amount: U256::from_str(&taker_amount)?,
            expiration: U256::from(expiration as u64),
            nonce: U256::ZERO,
            fee_rate_bps: U256::ZERO,
            side: instruction.side,
            signature_type: SignatureType::Eoa,
        })
    }

    /// Sign an order using EIP-712 typed data.
    async fn sign_order(&self, order: Order) -> Result<SignedOrder> {
        // keccak256("\x19\x01" + domainSeparator + orderHash)
        let mut message = vec![0x19, 0x01];
        message.extend_from_slice(&domain_separator(self.credentials.chain_id));
        message.extend_from_slice(&order.struct_hash());
        let digest = keccak256(&message);

        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .context("Failed to sign order")?;

        Ok(SignedOrder {
            salt: order.salt.to_string(),
            maker: order.maker.to_checksum(None),
            signer: order.signer.to_checksum(None),
            taker: order.taker.to_checksum(None),
            token_id: order.token_id.to_string(),
            maker_amount: order.maker_amount.to_string(),
            taker_amount: order.taker_amount.to_string(),
            side: order.side,
            expiration: order.expiration.to_string(),
            nonce: order.nonce.to_string(),
            fee_rate_bps: order.fee_rate_bps.to_string(),
            signature_type: order.signature_type as u8,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }

    /// Build L2 authentication headers (for write operations like order placement).
    fn l2_headers(&self, method: &str, path: &str, body: Option<&str>) -> Result<HeaderMap> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_l2_request(&self.credentials.api_secret, &timestamp, method, path, body)?;

        let mut headers = HeaderMap::new();
        let mut insert = |name: &'static str, value: &str| -> Result<()> {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_str(value)?);
            Ok(())
        };
        insert("poly_address", &self.address().to_checksum(None))?;
        insert("poly_signature", &signature)?;
        insert("poly_timestamp", &timestamp)?;
        insert("poly_api_key", &self.credentials.api_key)?;
        insert("poly_passphrase", &self.credentials.api_passphrase)?;

        Ok(headers)
    }
}

#[async_trait]
impl OrderExecutor for ClobClient {
    async fn place(&self, instruction: &TradeInstruction) -> Result<OrderReceipt, ExecutionError> {
        let response = self.market_order(instruction).await?;

        Ok(OrderReceipt {
            order_id: response.order_id,
            status: response.status,
            transaction_hash: response.transactions_hashes.into_iter().next(),
            simulated: false,
            submitted_at: Utc::now(),
        })
    }
}

fn venue(e: reqwest::Error) -> ExecutionError {
    ExecutionError::Venue(e.to_string())
}

/// Worst acceptable price: best quote widened by the slippage allowance,
/// kept inside the (0, 1) outcome price range.
fn limit_price(side: TradeSide, best: Decimal) -> Decimal {
    let best = best.clamp(Decimal::ZERO, Decimal::ONE);
    let price = match side {
        TradeSide::Buy => best * (Decimal::ONE + SLIPPAGE),
        TradeSide::Sell => best * (Decimal::ONE - SLIPPAGE),
    };
    price.clamp(dec!(0.001), dec!(0.999)).round_dp(4)
}

/// Maker and taker amounts in base units.
///
/// A buy gives USDC for shares; a sell gives shares for USDC.
/// `None` when the amounts do not fit in a `Decimal`.
fn order_amounts(side: TradeSide, shares: Decimal, price: Decimal) -> Option<(String, String)> {
    let usdc = to_base_units(shares.checked_mul(price)?)?;
    let shares = to_base_units(shares)?;
    Some(match side {
        TradeSide::Buy => (usdc, shares),
        TradeSide::Sell => (shares, usdc),
    })
}

/// Convert to base units (USDC and outcome tokens both use 6 decimals).
fn to_base_units(amount: Decimal) -> Option<String> {
    amount
        .checked_mul(dec!(1000000))
        .map(|units| units.trunc().normalize().to_string())
}

fn side_code(side: TradeSide) -> u8 {
    match side {
        TradeSide::Buy => 0,
        TradeSide::Sell => 1,
    }
}

/// Compute the EIP-712 domain separator.
fn domain_separator(chain_id: u64) -> [u8; 32] {
    let mut encoded = Vec::with_capacity(5 * 32);
    encoded.extend_from_slice(keccak256(DOMAIN_TYPE_STRING).as_slice());
    encoded.extend_from_slice(keccak256(b"Polymarket CTF Exchange").as_slice());
    encoded.extend_from_slice(keccak256(b"1").as_slice());
    encoded.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    encoded.extend_from_slice(&encode_address(
        Address::from_str(CTF_EXCHANGE).unwrap_or(Address::ZERO),
    ));
    keccak256(&encoded).0
}

/// HMAC-SHA256 over `timestamp + method + path + body`, URL-safe base64.
fn sign_l2_request(
    secret: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<String> {
    let message = format!("{}{}{}{}", timestamp, method, path, body.unwrap_or(""));

    let engine = &base64::engine::general_purpose::URL_SAFE;
    let secret_bytes = engine
        .decode(secret)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(secret))
        .context("Invalid API secret encoding")?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&secret_bytes)
        .map_err(|e| anyhow::anyhow!("Invalid API secret: {}", e))?;
    mac.update(message.as_bytes());
    Ok(engine.encode(mac.finalize().into_bytes()))
}

/// Encode address to 32-byte padded format.
fn encode_address(addr: Address) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(addr.as_slice());
    buf
}

/// Encode uint8 to 32-byte padded format.
fn encode_uint8(value: u8) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[31] = value;
    buf
}
