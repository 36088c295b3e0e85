mod ring_sink;

pub use ring_sink::*;
