//! 编排层：应用初始化与阶段调度

pub mod pipeline;
pub mod stages;

pub use pipeline::App;
pub use stages::StageContext;
