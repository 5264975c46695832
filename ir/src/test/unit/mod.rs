mod alloc_elim;
mod analysis;
mod stats;
