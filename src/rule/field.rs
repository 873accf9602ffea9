//! 规范字段定义
//! 所有厂商共享的规则字段名，配置中的字段名大小写/分隔符不敏感

use std::fmt;
use serde::{Serialize, Serializer};

/// 字段匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// 按空白/逗号/分号切分后做 token 交集
    Tokens,
    /// 整个字段值比较（日志描述、地址集合）
    Whole,
}

/// 规范字段
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleField {
    Id,
    Name,
    Action,
    Log,
    Comment,
    RiskRating,
    Status,
    Vendor,
    SrcAddr,
    DstAddr,
    Service,
    DstPort,
    SrcAddrNegate,
    DstAddrNegate,
    ServiceNegate,
    /// 非规范字段（extra_fields / 位置列中的其它列）
    Extra(String),
}

impl RuleField {
    /// 解析配置中的字段名
    /// `srcAddr` / `srcaddr` / `src_address` / `source` 均解析为 SrcAddr
    pub fn parse(raw: &str) -> Self {
        let squashed: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match squashed.as_str() {
            "id" => Self::Id,
            "name" => Self::Name,
            "action" => Self::Action,
            "log" => Self::Log,
            "comment" | "comments" => Self::Comment,
            "riskrating" => Self::RiskRating,
            "status" => Self::Status,
            "vendor" => Self::Vendor,
            "srcaddr" | "srcaddress" | "source" => Self::SrcAddr,
            "dstaddr" | "dstaddress" | "destination" => Self::DstAddr,
            "service" | "services" => Self::Service,
            "dstport" => Self::DstPort,
            "srcaddrnegate" => Self::SrcAddrNegate,
            "dstaddrnegate" => Self::DstAddrNegate,
            "servicenegate" => Self::ServiceNegate,
            _ => Self::Extra(raw.trim().to_lowercase()),
        }
    }

    /// 规范键名（用于发现项 field 与默认别名）
    pub fn key(&self) -> &str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Action => "action",
            Self::Log => "log",
            Self::Comment => "comment",
            Self::RiskRating => "risk_rating",
            Self::Status => "status",
            Self::Vendor => "vendor",
            Self::SrcAddr => "srcaddr",
            Self::DstAddr => "dstaddr",
            Self::Service => "service",
            Self::DstPort => "dst_port",
            Self::SrcAddrNegate => "srcaddr_negate",
            Self::DstAddrNegate => "dstaddr_negate",
            Self::ServiceNegate => "service_negate",
            Self::Extra(name) => name,
        }
    }

    /// 集合型字段（多行聚合取并集）
    pub fn is_set(&self) -> bool {
        matches!(self, Self::SrcAddr | Self::DstAddr | Self::Service)
    }

    /// 日志描述与地址字段整体比较，切分会破坏多词描述
    pub fn match_kind(&self) -> MatchKind {
        match self {
            Self::Log | Self::SrcAddr | Self::DstAddr => MatchKind::Whole,
            _ => MatchKind::Tokens,
        }
    }

    /// 对应的取反标志字段
    pub fn negate_flag(&self) -> Option<RuleField> {
        match self {
            Self::SrcAddr => Some(Self::SrcAddrNegate),
            Self::DstAddr => Some(Self::DstAddrNegate),
            Self::Service => Some(Self::ServiceNegate),
            _ => None,
        }
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for RuleField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}
