use serde::{Deserialize, Serialize};

use super::account::{Account, Role};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    pub total_admins: i64,
    pub blocked_users: i64,
    pub total_credits_in_system: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: AdminStats,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<Account>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    pub target_uid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRequest {
    pub target_uid: String,
    pub block: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    pub is_blocked: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub user_type: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsRequest {
    pub target_uid: String,
    pub action: String,
    pub amount: Option<i64>,
}

/// Administrative balance change. Results are clamped at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditAdjustment {
    Add(i64),
    Set(i64),
    Reset,
}

impl CreditAdjustment {
    pub fn parse(action: &str, amount: Option<i64>) -> Result<Self, String> {
        match (action, amount) {
            ("add", Some(n)) => Ok(CreditAdjustment::Add(n)),
            ("set", Some(n)) => Ok(CreditAdjustment::Set(n.max(0))),
            ("add" | "set", None) => Err(format!("Action '{action}' requires an amount")),
            ("reset", _) => Ok(CreditAdjustment::Reset),
            _ => Err("Invalid action".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_adjustments() {
        assert_eq!(CreditAdjustment::parse("add", Some(3)), Ok(CreditAdjustment::Add(3)));
        assert_eq!(CreditAdjustment::parse("set", Some(-4)), Ok(CreditAdjustment::Set(0)));
        assert_eq!(CreditAdjustment::parse("reset", None), Ok(CreditAdjustment::Reset));
    }

    #[test]
    fn test_parse_rejects_unknown_or_incomplete() {
        assert!(CreditAdjustment::parse("multiply", Some(2)).is_err());
        assert!(CreditAdjustment::parse("add", None).is_err());
    }
}
