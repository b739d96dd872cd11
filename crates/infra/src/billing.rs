//! Best-effort account balance lookup against the management API.
//!
//! Entirely independent of the job lifecycle.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::config::ManagementConfig;
use crate::generation::truncate_chars;

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("management API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("management API request failed: {0}")]
    Transport(String),
    #[error("unexpected invoice preview: {0}")]
    Format(String),
}

/// Balance figures in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub prepaid: i64,
    pub used: i64,
    pub remaining: i64,
    pub invoice: i64,
    pub total: i64,
}

impl Balance {
    /// Derive the balance from a postpaid invoice preview document.
    ///
    /// Monetary fields arrive as decimal strings (sometimes as numbers);
    /// absent fields count as zero.
    pub fn from_invoice_preview(doc: &Value) -> Result<Self, BillingError> {
        let invoice = doc.get("coreInvoice").cloned().unwrap_or(Value::Null);
        let at = |path: &[&str]| -> Result<i64, BillingError> {
            let mut node = &invoice;
            for key in path {
                match node.get(key) {
                    Some(next) => node = next,
                    None => return Ok(0),
                }
            }
            cents(node, &path.join("."))
        };

        let magnitude = |path: &[&str]| -> Result<i64, BillingError> {
            at(path)?.checked_abs().ok_or_else(|| {
                BillingError::Format(format!("{} is out of range", path.join(".")))
            })
        };

        let prepaid = magnitude(&["prepaidCredits", "val"])?;
        let used = magnitude(&["prepaidCreditsUsed", "val"])?;

        Ok(Self {
            prepaid,
            used,
            remaining: prepaid.saturating_sub(used).max(0),
            invoice: at(&["amountAfterVat"])?,
            total: at(&["totalWithCorr", "val"])?,
        })
    }
}

fn cents(value: &Value, field: &str) -> Result<i64, BillingError> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| BillingError::Format(format!("{field} is not an integer"))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| BillingError::Format(format!("{field} is not an integer: {s:?}"))),
        _ => Err(BillingError::Format(format!("{field} has an unexpected type"))),
    }
}

#[derive(Debug, Clone)]
pub struct BillingClient {
    http: reqwest::Client,
    config: ManagementConfig,
}

impl BillingClient {
    pub fn new(config: ManagementConfig) -> Result<Self, BillingError> {
        let http = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| BillingError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    #[instrument(skip(self), fields(team_id = %self.config.team_id), err)]
    pub async fn balance(&self) -> Result<Balance, BillingError> {
        let url = format!(
            "{}/v1/billing/teams/{}/postpaid/invoice/preview",
            self.config.base_url.trim_end_matches('/'),
            self.config.team_id
        );

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| BillingError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BillingError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(BillingError::Status {
                status: status.as_u16(),
                body: truncate_chars(&text, 200).to_string(),
            });
        }

        let doc: Value =
            serde_json::from_str(&text).map_err(|e| BillingError::Format(e.to_string()))?;
        Balance::from_invoice_preview(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use serde_json::json;

    #[test]
    fn balance_from_preview() {
        let doc = json!({
            "coreInvoice": {
                "prepaidCredits": { "val": "-5000" },
                "prepaidCreditsUsed": { "val": "-1250" },
                "amountAfterVat": "300",
                "totalWithCorr": { "val": 4200 }
            }
        });
        let balance = Balance::from_invoice_preview(&doc).unwrap();
        assert_eq!(
            balance,
            Balance {
                prepaid: 5000,
                used: 1250,
                remaining: 3750,
                invoice: 300,
                total: 4200
            }
        );
    }

    #[test]
    fn missing_fields_are_zero_and_remaining_never_negative() {
        let balance = Balance::from_invoice_preview(&json!({
            "coreInvoice": { "prepaidCreditsUsed": { "val": "700" } }
        }))
        .unwrap();
        assert_eq!(balance.prepaid, 0);
        assert_eq!(balance.used, 700);
        assert_eq!(balance.remaining, 0);

        let empty = Balance::from_invoice_preview(&json!({})).unwrap();
        assert_eq!(empty.total, 0);
    }

    #[test]
    fn garbage_amounts_are_rejected() {
        let err = Balance::from_invoice_preview(&json!({
            "coreInvoice": { "amountAfterVat": "twelve" }
        }))
        .unwrap_err();
        assert!(matches!(err, BillingError::Format(_)));
    }

    #[test]
    fn extreme_credit_values_are_a_format_error() {
        let err = Balance::from_invoice_preview(&json!({
            "coreInvoice": { "prepaidCredits": { "val": i64::MIN.to_string() } }
        }))
        .unwrap_err();
        assert!(matches!(err, BillingError::Format(_)), "{err:?}");

        let balance = Balance::from_invoice_preview(&json!({
            "coreInvoice": {
                "prepaidCredits": { "val": i64::MAX },
                "prepaidCreditsUsed": { "val": -i64::MAX }
            }
        }))
        .unwrap();
        assert_eq!(balance.remaining, 0);
    }

    #[tokio::test]
    async fn fetches_the_team_invoice_preview() {
        let app = Router::new().route(
            "/v1/billing/teams/:team/postpaid/invoice/preview",
            get(|Path(team): Path<String>| async move {
                if team != "team-1" {
                    return (StatusCode::NOT_FOUND, "{}".to_string());
                }
                (
                    StatusCode::OK,
                    json!({ "coreInvoice": { "prepaidCredits": { "val": "100" } } }).to_string(),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = |team: &str| ManagementConfig {
            api_key: "m".to_string(),
            team_id: team.to_string(),
            base_url: format!("http://{addr}"),
        };

        let balance = BillingClient::new(config("team-1")).unwrap().balance().await.unwrap();
        assert_eq!(balance.prepaid, 100);
        assert_eq!(balance.remaining, 100);

        let err = BillingClient::new(config("other")).unwrap().balance().await.unwrap_err();
        assert!(matches!(err, BillingError::Status { status: 404, .. }));
    }
}
