use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod common;
pub mod glottolog;
pub mod io;
pub mod phoible;
pub mod pipeline;
pub mod projection;
