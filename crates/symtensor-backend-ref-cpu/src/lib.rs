//! Reference host backend for `symtensor`.
//!
//! Kernels favour clarity over speed: every operation materialises dense `f64`/`i64`/`bool`
//! buffers and applies numpy broadcasting rules. Random draws seed a `StdRng` from the
//! generator state and report the next `u64` it produces as the following state.

pub mod cpu;

pub use cpu::{CpuBackend, CpuKernelInterceptor, GenericCpuBackend, NoopInterceptor};
