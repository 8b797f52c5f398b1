//! 버전 비교 유틸리티
//!
//! 로더 버전 문자열은 `0.3`, `v0.3.2`, `1.0.0-beta.1` 처럼 자릿수가 일정하지 않으므로
//! 빠진 자리는 0으로 채워 비교합니다.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 시맨틱 버전 (major.minor.patch[-prerelease])
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl SemVer {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let (numbers, prerelease) = match s.split_once('-') {
            Some((n, pre)) if !pre.is_empty() => (n, Some(pre.to_string())),
            Some(_) => return None,
            None => (s, None),
        };

        let mut parts = numbers.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        let patch = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        if parts.next().is_some() {
            return None;
        }

        Some(Self { major, minor, patch, prerelease })
    }

    pub fn is_newer_than(&self, other: &SemVer) -> bool {
        self > other
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }
}

/// `.`으로 나눈 식별자 단위 비교: 숫자끼리는 수치로, 숫자는 문자보다 앞
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(n), Ok(m)) => n.cmp(&m),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(_), Err(_)) => x.cmp(y),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 시작 시점 버전 판정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    /// 실행 중인 버전이 최소 지원 버전보다 낮음: 로더를 띄우면 안 됨
    Unsupported { current: SemVer, minimum: SemVer },
    /// 게시된 최신 버전이 더 높음
    UpdateAvailable { current: SemVer, latest: SemVer },
    UpToDate { current: SemVer },
}

/// 최소 지원 버전 확인이 최신 버전 확인보다 우선
pub fn availability(current: &SemVer, latest: Option<&SemVer>, minimum: Option<&SemVer>) -> Availability {
    if let Some(min) = minimum {
        if current < min {
            return Availability::Unsupported { current: current.clone(), minimum: min.clone() };
        }
    }
    match latest {
        Some(latest) if latest.is_newer_than(current) => Availability::UpdateAvailable {
            current: current.clone(),
            latest: latest.clone(),
        },
        _ => Availability::UpToDate { current: current.clone() },
    }
}
