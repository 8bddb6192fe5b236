use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] braid_ledger::LedgerError),

    #[error("network error: {0}")]
    Network(#[from] braid_network::NetworkError),

    #[error("protocol error: {0}")]
    Protocol(#[from] braid_protocol::ProtocolError),

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node already started")]
    AlreadyStarted,
}
