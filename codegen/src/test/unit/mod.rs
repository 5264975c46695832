mod ir;
mod pipeline;
mod profile;
mod promote;
mod select;
