//! 通用工具：字段切分、端口提取、服务名归一化
pub mod tokenizer;
pub mod port;

pub use self::tokenizer::{tokenize, split_cell_values, is_blank_value};
pub use self::port::{extract_port, ServicePortMap};
