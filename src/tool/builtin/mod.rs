mod wikipedia;

pub use wikipedia::{WikipediaOptions, WikipediaTool};
