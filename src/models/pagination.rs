//! 分页相关的数据结构（limit / offset）

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitOffsetParams {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffsetParams {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self { limit, offset }
    }

    pub fn get_limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn get_offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_offset_defaults() {
        let params = LimitOffsetParams::new(None, None);
        assert_eq!(params.get_limit(), 20);
        assert_eq!(params.get_offset(), 0);
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(LimitOffsetParams::new(Some(0), None).get_limit(), 1);
        assert_eq!(LimitOffsetParams::new(Some(500), Some(40)).get_limit(), 100);
        assert_eq!(LimitOffsetParams::new(Some(10), Some(40)).get_offset(), 40);
    }
}
