//! Rendering: renderers, sample placement, tile scheduling and render tasks

pub mod sampling;
pub mod renderer;
pub mod load_balancer;
pub mod task;

pub use load_balancer::{CancelToken, LocalTiledLoadBalancer, Progress, TiledLoadBalancer};
pub use renderer::{render_tile, ConstantRenderer, FrameContext, PickResult, RaycastRenderer, RenderSample, Renderer};
pub use task::{RenderTask, TaskState};
