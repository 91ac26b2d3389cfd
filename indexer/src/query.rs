//! `sg_findRelations` parameters and filtering.

use std::str::FromStr;

use anchor_lang::prelude::Pubkey;
use serde::Deserialize;

use crate::error::{IndexerError, IndexerResult};
use crate::types::RelationRecord;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Raw request parameters as they arrive on the wire.
///
/// Empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FindRelationsParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub providers: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub after: Option<String>,
}

/// Validated filter. `after` is the leaf index of the last record of the
/// previous page; results continue strictly below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationFilter {
    pub from: Option<Pubkey>,
    pub to: Option<Pubkey>,
    pub providers: Vec<Pubkey>,
    pub limit: usize,
    pub after: Option<u32>,
}

impl Default for RelationFilter {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            providers: Vec::new(),
            limit: DEFAULT_LIMIT,
            after: None,
        }
    }
}

impl RelationFilter {
    pub fn matches(&self, record: &RelationRecord) -> bool {
        self.from.map_or(true, |from| record.from == from)
            && self.to.map_or(true, |to| record.to == to)
            && (self.providers.is_empty() || self.providers.contains(&record.provider))
            && self.after.map_or(true, |after| record.leaf_index < after)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_key(field: &str, value: &str) -> IndexerResult<Pubkey> {
    Pubkey::from_str(value)
        .map_err(|_| IndexerError::invalid_filter(format!("invalid {field}: {value}")))
}

impl TryFrom<FindRelationsParams> for RelationFilter {
    type Error = IndexerError;

    fn try_from(params: FindRelationsParams) -> IndexerResult<Self> {
        let limit = match params.limit {
            None | Some(0) => DEFAULT_LIMIT,
            Some(limit) if limit > MAX_LIMIT => {
                return Err(IndexerError::invalid_filter("invalid limit"));
            }
            Some(limit) => limit,
        };

        let from = non_empty(params.from)
            .map(|v| parse_key("from", &v))
            .transpose()?;
        let to = non_empty(params.to).map(|v| parse_key("to", &v)).transpose()?;
        let providers = params
            .providers
            .unwrap_or_default()
            .iter()
            .filter(|v| !v.is_empty())
            .map(|v| parse_key("provider", v))
            .collect::<IndexerResult<Vec<_>>>()?;
        let after = non_empty(params.after)
            .map(|v| {
                v.parse::<u32>()
                    .map_err(|_| IndexerError::invalid_filter(format!("invalid after: {v}")))
            })
            .transpose()?;

        Ok(Self {
            from,
            to,
            providers,
            limit,
            after,
        })
    }
}
