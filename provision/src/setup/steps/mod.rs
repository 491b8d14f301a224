pub mod cni;
pub mod containerd;
pub mod control_plane;
pub mod disable_swap;
pub mod join_token;
pub mod kernel_modules;
pub mod kubes;
pub mod preflight;
pub mod role;
pub mod sysctl;

pub use cni::CniInstall;
pub use containerd::ContainerRuntime;
pub use control_plane::ClusterBootstrap;
pub use disable_swap::DisableSwap;
pub use join_token::JoinToken;
pub use kernel_modules::KernelModules;
pub use kubes::KubeComponents;
pub use preflight::Preflight;
pub use role::RoleSelector;
pub use sysctl::Sysctl;
