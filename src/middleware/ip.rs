//! 클라이언트 IP 판별과 CIDR 범위 검사

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use hyper::Request;

use super::handler::ConnectionInfo;
use crate::dynamic::IpStrategyConfig;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid IP range {0:?}")]
pub struct InvalidRange(pub String);

/// CIDR 범위. 접두사 길이가 없으면 단일 주소로 취급합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

impl IpRange {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, normalize(ip)) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                mask_eq(u32::from(net) as u128, u32::from(ip) as u128, self.prefix, 32)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                mask_eq(u128::from(net), u128::from(ip), self.prefix, 128)
            }
            _ => false,
        }
    }
}

fn mask_eq(a: u128, b: u128, prefix: u8, bits: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    let shift = u32::from(bits - prefix);
    (a >> shift) == (b >> shift)
}

/// IPv4-mapped IPv6 주소는 IPv4로 봅니다.
fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

impl FromStr for IpRange {
    type Err = InvalidRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRange(s.to_string());
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let network = normalize(addr.parse::<IpAddr>().map_err(|_| invalid())?);
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix > max {
            return Err(invalid());
        }
        Ok(Self { network, prefix })
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// 허용 범위 목록
#[derive(Debug, Clone, Default)]
pub struct IpChecker {
    ranges: Vec<IpRange>,
}

impl IpChecker {
    pub fn new<S: AsRef<str>>(ranges: &[S]) -> Result<Self, InvalidRange> {
        let ranges = ranges
            .iter()
            .map(|r| r.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ranges })
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }

    /// 문자열 주소를 검사합니다. 포트가 붙어 있어도 됩니다.
    pub fn contains_str(&self, addr: &str) -> bool {
        parse_host(addr).is_some_and(|ip| self.contains(ip))
    }
}

/// `1.2.3.4`, `1.2.3.4:80`, `[::1]:80`, `::1`을 모두 받습니다.
pub fn parse_host(addr: &str) -> Option<IpAddr> {
    let addr = addr.trim();
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split_once(']')?.0.parse().ok();
    }
    addr.rsplit_once(':')?.0.parse().ok()
}

/// 클라이언트 IP 선택 전략
#[derive(Debug, Clone)]
pub enum IpStrategy {
    /// 연결의 원격 주소
    RemoteAddr,
    /// X-Forwarded-For의 오른쪽에서 depth번째 값
    Depth(usize),
    /// X-Forwarded-For를 오른쪽부터 보면서 제외 범위에 없는 첫 값
    Excluded(IpChecker),
}

impl IpStrategy {
    pub fn from_config(config: Option<&IpStrategyConfig>) -> Result<Self, InvalidRange> {
        match config {
            Some(c) if c.depth > 0 => Ok(IpStrategy::Depth(c.depth)),
            Some(c) if !c.excluded_ips.is_empty() => {
                Ok(IpStrategy::Excluded(IpChecker::new(&c.excluded_ips)?))
            }
            _ => Ok(IpStrategy::RemoteAddr),
        }
    }

    /// 판별한 클라이언트 IP 문자열. 찾지 못하면 빈 문자열입니다.
    pub fn client_ip<B>(&self, req: &Request<B>) -> String {
        match self {
            IpStrategy::RemoteAddr => ConnectionInfo::from_request(req)
                .map(|info| info.remote_addr.ip().to_string())
                .unwrap_or_default(),
            IpStrategy::Depth(depth) => {
                let hops = forwarded_for(req);
                if *depth > hops.len() {
                    return String::new();
                }
                hops[hops.len() - depth].clone()
            }
            IpStrategy::Excluded(excluded) => forwarded_for(req)
                .into_iter()
                .rev()
                .find(|hop| !excluded.contains_str(hop))
                .unwrap_or_default(),
        }
    }
}

fn forwarded_for<B>(req: &Request<B>) -> Vec<String> {
    req.headers()
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|hop| hop.trim().to_string())
        .filter(|hop| !hop.is_empty())
        .collect()
}
