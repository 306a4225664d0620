//! CLOB API client for trading
//!
//! Covers the operations the HTTP facade needs: API-credential derivation,
//! price lookup, collateral balance, and fill-or-kill market orders.
//!
//! Authentication is two-level. L1 is an EIP-712 signature over a `ClobAuth`
//! attestation, exchanged once for API credentials. L2 signs each request
//! with HMAC-SHA256 over `timestamp + method + path + body`.

use crate::error::{BackendError, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use std::sync::OnceLock;

/// CTF Exchange contract on Polygon, the EIP-712 verifying contract for orders
const EXCHANGE_ADDRESS: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

const CLOB_AUTH_MESSAGE: &str = "This message attests that I control the given wallet";

/// Order side, encoded as uint8 in the signed struct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl Side {
    fn as_u8(self) -> u8 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCreds {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub success: bool,
    #[serde(rename = "errorMsg", default)]
    pub error_msg: String,
    #[serde(rename = "orderID", default)]
    pub order_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: String,
}

#[derive(Debug, Deserialize)]
struct MidpointResponse {
    mid: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: String,
}

/// CLOB API client
pub struct ClobClient {
    http: Client,
    base_url: String,
    wallet: LocalWallet,
    funder: Address,
    signature_type: u8,
    creds: OnceLock<ApiCreds>,
}

impl ClobClient {
    pub fn new(
        base_url: &str,
        private_key: &str,
        funder_address: Option<&str>,
        chain_id: u64,
        signature_type: u8,
    ) -> Result<Self> {
        let wallet = LocalWallet::from_str(private_key)
            .map_err(|e| BackendError::Config(format!("Invalid private key: {}", e)))?
            .with_chain_id(chain_id);

        // Magic/proxy wallets hold the funds; the EOA only signs
        let funder = match funder_address {
            Some(addr) => Address::from_str(addr)
                .map_err(|e| BackendError::Config(format!("Invalid funder address: {}", e)))?,
            None => wallet.address(),
        };

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            wallet,
            funder,
            signature_type,
            creds: OnceLock::new(),
        })
    }

    /// Derive API credentials. Must be called before any L2-authenticated
    /// operation; repeat calls are no-ops.
    pub async fn initialize(&self) -> Result<()> {
        if self.creds.get().is_some() {
            return Ok(());
        }

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let nonce = 0u64;
        let signature = self.sign_clob_auth(&timestamp, nonce)?;

        let resp = self
            .http
            .get(format!("{}/auth/derive-api-key", self.base_url))
            .header("POLY_ADDRESS", format!("{:?}", self.wallet.address()))
            .header("POLY_NONCE", nonce.to_string())
            .header("POLY_SIGNATURE", signature)
            .header("POLY_TIMESTAMP", &timestamp)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::Auth(format!(
                "derive-api-key failed: {} - {}",
                status, text
            )));
        }

        let creds: ApiCreds = resp.json().await?;
        tracing::info!("derived CLOB API credentials: key={}", creds.api_key);
        let _ = self.creds.set(creds);
        Ok(())
    }

    /// Best available price for one side of a token
    pub async fn get_price(&self, token_id: &str, side: Side) -> Result<Decimal> {
        let resp: PriceResponse = self
            .http
            .get(format!("{}/price", self.base_url))
            .query(&[("token_id", token_id), ("side", side.as_str())])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| BackendError::Api(format!("price lookup failed: {}", e)))?
            .json()
            .await?;

        Decimal::from_str(&resp.price)
            .map_err(|e| BackendError::Api(format!("unparseable price {:?}: {}", resp.price, e)))
    }

    /// Midpoint between best bid and best ask
    pub async fn get_midpoint(&self, token_id: &str) -> Result<Decimal> {
        let resp: MidpointResponse = self
            .http
            .get(format!("{}/midpoint", self.base_url))
            .query(&[("token_id", token_id)])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| BackendError::Api(format!("midpoint lookup failed: {}", e)))?
            .json()
            .await?;

        Decimal::from_str(&resp.mid)
            .map_err(|e| BackendError::Api(format!("unparseable midpoint: {}", e)))
    }

    /// Collateral (USDC) balance of the funder wallet
    pub async fn get_balance(&self) -> Result<Decimal> {
        let path = "/balance-allowance";
        let (headers, _) = self.l2_auth("GET", path, "")?;

        let mut req = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(&[("asset_type", "COLLATERAL")]);
        for (name, value) in headers {
            req = req.header(name, value);
        }

        let resp: BalanceResponse = req
            .send()
            .await?
            .error_for_status()
            .map_err(|e| BackendError::Api(format!("balance lookup failed: {}", e)))?
            .json()
            .await?;

        Decimal::from_str(&resp.balance)
            .map_err(|e| BackendError::Api(format!("unparseable balance: {}", e)))
    }

    /// Place a fill-or-kill market buy for `usd_amount` of the given token.
    ///
    /// Marketable price comes from the book's best offer; maker/taker amounts
    /// are expressed in 6-decimal base units as the exchange expects.
    pub async fn place_market_order(
        &self,
        token_id: &str,
        side: Side,
        usd_amount: Decimal,
    ) -> Result<OrderResponse> {
        if usd_amount <= Decimal::ZERO {
            return Err(BackendError::OrderRejected(
                "amount must be positive".to_string(),
            ));
        }

        let price = self.get_price(token_id, side).await?;
        if price <= Decimal::ZERO {
            return Err(BackendError::OrderRejected(format!(
                "no marketable price for token {}",
                token_id
            )));
        }

        let shares = (usd_amount / price).round_dp(2);
        let (maker_amount, taker_amount) = match side {
            // Buying: give USDC, take shares
            Side::Buy => (to_base_units(usd_amount)?, to_base_units(shares)?),
            // Selling: give shares, take USDC
            Side::Sell => (to_base_units(shares)?, to_base_units(usd_amount)?),
        };

        let salt: u64 = rand::random();
        let token_uint = U256::from_dec_str(token_id)
            .map_err(|e| BackendError::OrderRejected(format!("invalid token id: {}", e)))?;

        let signature = self.sign_order(
            salt,
            token_uint,
            maker_amount,
            taker_amount,
            side,
        )?;

        let body = serde_json::json!({
            "order": {
                "salt": salt,
                "maker": format!("{:?}", self.funder),
                "signer": format!("{:?}", self.wallet.address()),
                "taker": "0x0000000000000000000000000000000000000000",
                "tokenId": token_id,
                "makerAmount": maker_amount.to_string(),
                "takerAmount": taker_amount.to_string(),
                "expiration": "0",
                "nonce": "0",
                "feeRateBps": "0",
                "side": side.as_str(),
                "signatureType": self.signature_type,
                "signature": signature,
            },
            "owner": self.require_creds()?.api_key,
            "orderType": "FOK",
        });
        let body_str = body.to_string();

        let path = "/order";
        let (headers, _) = self.l2_auth("POST", path, &body_str)?;

        let mut req = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("content-type", "application/json");
        for (name, value) in headers {
            req = req.header(name, value);
        }

        let resp = req.body(body_str).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::OrderRejected(format!(
                "order post failed: {} - {}",
                status, text
            )));
        }

        let order: OrderResponse = resp.json().await?;
        if !order.success {
            return Err(BackendError::OrderRejected(order.error_msg));
        }

        tracing::info!("order placed: id={} status={}", order.order_id, order.status);
        Ok(order)
    }

    fn require_creds(&self) -> Result<&ApiCreds> {
        self.creds
            .get()
            .ok_or_else(|| BackendError::Auth("client not initialized".to_string()))
    }

    /// L1: EIP-712 signature over the ClobAuth attestation
    fn sign_clob_auth(&self, timestamp: &str, nonce: u64) -> Result<String> {
        let type_hash = keccak256(
            b"ClobAuth(address address,string timestamp,uint256 nonce,string message)",
        );

        let struct_hash = keccak256(ethers::abi::encode(&[
            Token::FixedBytes(type_hash.to_vec()),
            Token::Address(self.wallet.address()),
            Token::FixedBytes(keccak256(timestamp.as_bytes()).to_vec()),
            Token::Uint(U256::from(nonce)),
            Token::FixedBytes(keccak256(CLOB_AUTH_MESSAGE.as_bytes()).to_vec()),
        ]));

        let domain_type_hash =
            keccak256(b"EIP712Domain(string name,string version,uint256 chainId)");
        let domain_separator = keccak256(ethers::abi::encode(&[
            Token::FixedBytes(domain_type_hash.to_vec()),
            Token::FixedBytes(keccak256(b"ClobAuthDomain").to_vec()),
            Token::FixedBytes(keccak256(b"1").to_vec()),
            Token::Uint(U256::from(self.wallet.chain_id())),
        ]));

        self.sign_digest(domain_separator, struct_hash)
    }

    /// EIP-712 signature over the CTF Exchange Order struct
    fn sign_order(
        &self,
        salt: u64,
        token_id: U256,
        maker_amount: u64,
        taker_amount: u64,
        side: Side,
    ) -> Result<String> {
        let type_hash = keccak256(
            b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)",
        );

        let struct_hash = keccak256(ethers::abi::encode(&[
            Token::FixedBytes(type_hash.to_vec()),
            Token::Uint(U256::from(salt)),
            Token::Address(self.funder),
            Token::Address(self.wallet.address()),
            Token::Address(Address::zero()),
            Token::Uint(token_id),
            Token::Uint(U256::from(maker_amount)),
            Token::Uint(U256::from(taker_amount)),
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
            Token::Uint(U256::from(side.as_u8())),
            Token::Uint(U256::from(self.signature_type)),
        ]));

        let domain_type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let exchange = Address::from_str(EXCHANGE_ADDRESS)
            .map_err(|e| BackendError::Signing(e.to_string()))?;
        let domain_separator = keccak256(ethers::abi::encode(&[
            Token::FixedBytes(domain_type_hash.to_vec()),
            Token::FixedBytes(keccak256(b"Polymarket CTF Exchange").to_vec()),
            Token::FixedBytes(keccak256(b"1").to_vec()),
            Token::Uint(U256::from(self.wallet.chain_id())),
            Token::Address(exchange),
        ]));

        self.sign_digest(domain_separator, struct_hash)
    }

    fn sign_digest(&self, domain_separator: [u8; 32], struct_hash: [u8; 32]) -> Result<String> {
        let mut preimage = Vec::with_capacity(66);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(&domain_separator);
        preimage.extend_from_slice(&struct_hash);
        let digest = keccak256(&preimage);

        let signature = self
            .wallet
            .sign_hash(H256::from(digest))
            .map_err(|e| BackendError::Signing(e.to_string()))?;

        Ok(format!("0x{}", signature))
    }

    /// L2: HMAC headers over `timestamp + method + path + body`
    fn l2_auth(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<(Vec<(&'static str, String)>, String)> {
        let creds = self.require_creds()?;
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let message = format!("{}{}{}{}", timestamp, method, path, body);

        let secret_bytes = URL_SAFE
            .decode(&creds.secret)
            .map_err(|e| BackendError::Auth(format!("invalid API secret encoding: {}", e)))?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&secret_bytes)
            .map_err(|e| BackendError::Auth(format!("invalid HMAC secret: {}", e)))?;
        mac.update(message.as_bytes());
        let signature = URL_SAFE.encode(mac.finalize().into_bytes());

        let headers = vec![
            ("POLY_ADDRESS", format!("{:?}", self.wallet.address())),
            ("POLY_SIGNATURE", signature.clone()),
            ("POLY_TIMESTAMP", timestamp),
            ("POLY_API_KEY", creds.api_key.clone()),
            ("POLY_PASSPHRASE", creds.passphrase.clone()),
        ];
        Ok((headers, signature))
    }
}

fn to_base_units(amount: Decimal) -> Result<u64> {
    (amount * Decimal::from(1_000_000))
        .trunc()
        .to_u64()
        .ok_or_else(|| BackendError::OrderRejected(format!("amount out of range: {}", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    fn test_client(base_url: &str) -> ClobClient {
        ClobClient::new(
            base_url,
            TEST_KEY,
            Some("0x1234567890123456789012345678901234567890"),
            137,
            1,
        )
        .unwrap()
    }

    async fn mount_creds(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/auth/derive-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "apiKey": "11111111-2222-3333-4444-555555555555",
                "secret": URL_SAFE.encode(b"mock-secret-bytes-1234567890123456"),
                "passphrase": "mock-pass"
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_side_encoding() {
        assert_eq!(Side::Buy.as_u8(), 0);
        assert_eq!(Side::Sell.as_u8(), 1);
        assert_eq!(Side::Buy.as_str(), "BUY");
    }

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units(dec!(10)).unwrap(), 10_000_000);
        assert_eq!(to_base_units(dec!(0.55)).unwrap(), 550_000);
        // Sub-micro precision truncates
        assert_eq!(to_base_units(dec!(0.0000001)).unwrap(), 0);
    }

    #[test]
    fn test_sign_order_is_deterministic() {
        let client = test_client("http://localhost");
        let a = client
            .sign_order(42, U256::from(7u64), 1_000_000, 2_000_000, Side::Buy)
            .unwrap();
        let b = client
            .sign_order(42, U256::from(7u64), 1_000_000, 2_000_000, Side::Buy)
            .unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("0x"));

        // Different salt, different signature
        let c = client
            .sign_order(43, U256::from(7u64), 1_000_000, 2_000_000, Side::Buy)
            .unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_initialize_derives_creds_once() {
        let server = MockServer::start().await;
        mount_creds(&server).await;

        let client = test_client(&server.uri());
        client.initialize().await.unwrap();
        client.initialize().await.unwrap();
        assert_eq!(
            client.require_creds().unwrap().api_key,
            "11111111-2222-3333-4444-555555555555"
        );
    }

    #[tokio::test]
    async fn test_get_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price"))
            .and(query_param("token_id", "123"))
            .and(query_param("side", "BUY"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"price": "0.55"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let price = client.get_price("123", Side::Buy).await.unwrap();
        assert_eq!(price, dec!(0.55));
    }

    #[tokio::test]
    async fn test_place_market_order_full_flow() {
        let server = MockServer::start().await;
        mount_creds(&server).await;

        Mock::given(method("GET"))
            .and(path("/price"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"price": "0.50"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/order"))
            .and(body_string_contains("\"orderType\":\"FOK\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "errorMsg": "",
                "orderID": "0xdeadbeef",
                "status": "matched"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.initialize().await.unwrap();
        let resp = client
            .place_market_order("123", Side::Buy, dec!(10))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.order_id, "0xdeadbeef");
    }

    #[tokio::test]
    async fn test_place_market_order_rejected() {
        let server = MockServer::start().await;
        mount_creds(&server).await;

        Mock::given(method("GET"))
            .and(path("/price"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"price": "0.50"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "errorMsg": "not enough balance",
                "orderID": "",
                "status": ""
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.initialize().await.unwrap();
        let err = client
            .place_market_order("123", Side::Buy, dec!(10))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::OrderRejected(_)));
    }

    #[tokio::test]
    async fn test_order_requires_initialization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"price": "0.50"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .place_market_order("123", Side::Buy, dec!(10))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)));
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let client = test_client("http://localhost");
        let err = client
            .place_market_order("123", Side::Buy, Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::OrderRejected(_)));
    }
}
