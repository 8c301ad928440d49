mod client_ctx;

pub use client_ctx::{bearer_token, ClientCtx, ClientCtxInner};
