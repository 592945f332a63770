//! Proxy-chain and routing configuration compiler
//! 代理链与路由配置编译器
//!
//! # Global Strategic Logic / 全局战略逻辑
//! This crate turns stored proxy profiles, chains and routing chains into one
//! sing-box document.
//! 本 crate 把存储的代理配置、链与路由链编译为一份 sing-box 文档。
//!
//! ## Strategic Workflow / 战略工作流
//! `Profile` -> `Resolve (chain + group wrappers)` -> `Link (native detour / bridge rules)`
//! -> `Routing rules + rule sets` -> `DNS` -> `Override merge` -> `Document`
//!
//! ## Key Modules / 关键模块
//! - [`build`]: **Assembly** - single-profile and batch documents.
//!   **组装** - 单配置与批量文档。
//! - [`chain`]: **Chains** - hop resolution and linking.
//!   **链** - 跳点解析与连接。
//! - [`bean`]: **Protocols** - per-protocol outbound generation and bridging.
//!   **协议** - 各协议出站生成与外部桥接。
//! - [`merge`]: **Overrides** - deep merge of user override trees.
//!   **覆盖** - 用户覆盖树的深度合并。

pub mod bean;
pub mod build;
pub mod chain;
pub mod de;
pub mod dns;
pub mod merge;
pub mod model;
pub mod outbound;
pub mod route;
pub mod settings;
pub mod store;
pub mod tag;

pub use bean::{Bean, Bridging, ExternalDescriptor};
pub use build::{BatchOutput, BuildOutput, Builder};
pub use model::{Group, MuxState, ProxyEntity, TrafficData};
pub use route::{RouteRule, RoutingChain};
pub use settings::BuildSettings;
pub use store::{MemoryStore, ProfileDb, ProfileStore};
