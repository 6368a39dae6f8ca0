//! Resource-binding translation.
//!
//! When a pipeline is realized its resource layouts are walked once, in
//! declaration order, and every element is given the backend-native binding
//! point it will use. Binding a resource set later is a table lookup.

mod explicit;
mod reflection;

pub(crate) use explicit::{translate, ExplicitBindings, SlotModel};
pub(crate) use reflection::{reflect_bindings, GlBindings, GlTextureBinding};
