//! The filesystem operations surface: one module per group of related
//! operations, each a free function taking the driver, the request
//! context, and a resource reference, following the same validate,
//! resolve, contain, dispatch, translate-errors template throughout.

pub mod content;
pub mod dir;
pub mod grants;
pub mod locks;
pub mod metadata;
pub mod quota;
pub mod unsupported;
