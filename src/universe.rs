//! Universe ingestion: the exchange reference-data endpoint (spec §6).
//!
//! `spec.md` treats `Universe(market) -> {tickerCode}` as an external
//! collaborator; this is the concrete, swappable implementation a runnable
//! crate needs. Grounded on `scrapers/polymarket_gamma.rs`'s
//! fetch-and-filter shape: one `Client::get`, decode into a typed root,
//! then a plain iterator filter/dedup pass with no further I/O.

use std::collections::HashSet;

use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::error::CoreError;

const COMMON_STOCK: &str = "보통주";

#[derive(Debug, Clone, Deserialize)]
struct RefRow {
    #[serde(rename = "ISU_SRT_CD")]
    isu_srt_cd: String,
    #[serde(rename = "ISU_ABBRV")]
    isu_abbrv: String,
    #[serde(rename = "ISU_ENG_NM")]
    isu_eng_nm: String,
    #[serde(rename = "MKT_TP_NM")]
    mkt_tp_nm: String,
    #[serde(rename = "SECT_TP_NM")]
    sect_tp_nm: String,
    #[serde(rename = "KIND_STKCERT_TP_NM")]
    kind_stkcert_tp_nm: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RefRoot {
    #[serde(rename = "OutBlock_1")]
    out_block_1: Vec<RefRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseTicker {
    pub code: String,
    pub short_name: String,
    pub corporate_name: String,
    pub market: String,
    pub sector: String,
}

pub struct UniverseClient {
    client: Client,
    ref_key: String,
}

impl UniverseClient {
    pub fn new(ref_key: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build universe http client");
        Self { client, ref_key }
    }

    /// Fetches one market's reference set: keeps only common-stock rows,
    /// dedups by code (first-wins), and strips a leading `"A"` prefix.
    pub async fn fetch(&self, url: &str) -> Result<Vec<UniverseTicker>, CoreError> {
        let response = self
            .client
            .get(url)
            .query(&[("key", self.ref_key.as_str())])
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::HttpStatus(response.status().as_u16()));
        }

        let text = response.text().await.map_err(|e| CoreError::Network(e.to_string()))?;
        let root: RefRoot = serde_json::from_str(&text).map_err(|e| CoreError::Decode(e.into()))?;

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in root.out_block_1 {
            if row.kind_stkcert_tp_nm != COMMON_STOCK {
                continue;
            }
            let code = strip_leading_a(&row.isu_srt_cd);
            if !seen.insert(code.clone()) {
                continue;
            }
            out.push(UniverseTicker {
                code,
                short_name: row.isu_abbrv,
                corporate_name: row.isu_eng_nm,
                market: row.mkt_tp_nm,
                sector: row.sect_tp_nm,
            });
        }

        info!(count = out.len(), "universe reference rows fetched");
        Ok(out)
    }
}

fn strip_leading_a(code: &str) -> String {
    code.strip_prefix('A').unwrap_or(code).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_a_prefix() {
        assert_eq!(strip_leading_a("A005930"), "005930");
        assert_eq!(strip_leading_a("005930"), "005930");
    }

    #[test]
    fn filters_and_dedups() {
        let rows = vec![
            RefRow {
                isu_srt_cd: "A000001".to_string(),
                isu_abbrv: "One".to_string(),
                isu_eng_nm: "One Co".to_string(),
                mkt_tp_nm: "KOSPI".to_string(),
                sect_tp_nm: "Tech".to_string(),
                kind_stkcert_tp_nm: COMMON_STOCK.to_string(),
            },
            RefRow {
                isu_srt_cd: "A000001".to_string(),
                isu_abbrv: "One Dup".to_string(),
                isu_eng_nm: "One Co Dup".to_string(),
                mkt_tp_nm: "KOSPI".to_string(),
                sect_tp_nm: "Tech".to_string(),
                kind_stkcert_tp_nm: COMMON_STOCK.to_string(),
            },
            RefRow {
                isu_srt_cd: "A000002".to_string(),
                isu_abbrv: "Pref".to_string(),
                isu_eng_nm: "Pref Co".to_string(),
                mkt_tp_nm: "KOSPI".to_string(),
                sect_tp_nm: "Tech".to_string(),
                kind_stkcert_tp_nm: "우선주".to_string(),
            },
        ];
        let root = RefRoot { out_block_1: rows };
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in root.out_block_1 {
            if row.kind_stkcert_tp_nm != COMMON_STOCK {
                continue;
            }
            let code = strip_leading_a(&row.isu_srt_cd);
            if !seen.insert(code.clone()) {
                continue;
            }
            out.push(code);
        }
        assert_eq!(out, vec!["000001".to_string()]);
    }
}
