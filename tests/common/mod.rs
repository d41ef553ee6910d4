pub mod mock_node;
pub mod test_db;

pub fn set_tracing_subscriber(set: bool) -> Option<tracing::dispatcher::DefaultGuard> {
    if !set {
        return None;
    }
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(tracing::Level::INFO)
        .with_env_filter("tw=trace")
        .finish();
    Some(tracing::subscriber::set_default(subscriber))
}
