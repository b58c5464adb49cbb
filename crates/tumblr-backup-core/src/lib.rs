pub mod config;
pub mod logging;

pub mod api_client;
pub mod concurrency;
pub mod coordinator;
pub mod host_blacklist;
pub mod http_retriever;
pub mod media;
pub mod reblog;
pub mod renderer;
pub mod retry;
pub mod storage;
pub mod url_model;
