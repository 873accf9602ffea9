//! 端口提取与服务名归一化

use std::collections::HashMap;
use once_cell::sync::Lazy;
use regex::Regex;

static FIRST_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// 提取服务字符串中的第一个数字串（如 `TCP_3389` -> `3389`）
pub fn extract_port(service: &str) -> String {
    FIRST_DIGITS
        .find(service)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// 服务名 -> 端口映射，运行期只读
/// 端口值在加载时校验为纯数字，保证归一化幂等
#[derive(Debug, Clone, Default)]
pub struct ServicePortMap {
    ports: HashMap<String, String>,
}

impl ServicePortMap {
    /// 键统一转小写；调用方负责端口值校验
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let ports = entries
            .into_iter()
            .map(|(service, port)| (service.trim().to_lowercase(), port.trim().to_string()))
            .collect();
        Self { ports }
    }

    /// 服务名转端口，未知服务返回小写原值
    pub fn normalize(&self, service: &str) -> String {
        let lowered = service.trim().to_lowercase();
        match self.ports.get(&lowered) {
            Some(port) => port.clone(),
            None => lowered,
        }
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
