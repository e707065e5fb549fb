use std::str::FromStr;

use hyper::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status code range {block:?}: {reason}")]
pub struct RangeError {
    block: String,
    reason: String,
}

/// `"500-599"` 또는 `"404"` 형태의 상태 코드 범위 목록 (양 끝 포함)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpCodeRanges(Vec<(u16, u16)>);

impl HttpCodeRanges {
    pub fn parse<S: AsRef<str>>(blocks: &[S]) -> Result<Self, RangeError> {
        blocks
            .iter()
            .map(|block| parse_block(block.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn contains(&self, status: StatusCode) -> bool {
        let code = status.as_u16();
        self.0.iter().any(|&(low, high)| low <= code && code <= high)
    }
}

impl FromStr for HttpCodeRanges {
    type Err = RangeError;

    /// 쉼표로 구분된 범위 목록을 파싱합니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let blocks: Vec<&str> = s.split(',').collect();
        Self::parse(&blocks)
    }
}

fn parse_block(block: &str) -> Result<(u16, u16), RangeError> {
    let invalid = |reason: &str| RangeError {
        block: block.to_string(),
        reason: reason.to_string(),
    };
    let code = |value: &str| {
        value
            .trim()
            .parse::<u16>()
            .map_err(|e| invalid(&e.to_string()))
    };

    let (low, high) = match block.split_once('-') {
        Some((low, high)) => (code(low)?, code(high)?),
        None => {
            let single = code(block)?;
            (single, single)
        }
    };

    if low > high {
        return Err(invalid("lower bound is greater than upper bound"));
    }
    Ok((low, high))
}
