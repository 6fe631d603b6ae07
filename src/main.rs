//! slircb binary: configuration, wiring, and the run loop.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slircb::bus::{Event, EventBus, EventName};
use slircb::config::Config;
use slircb::control;
use slircb::history::{self, HistoryProvider, NoOpProvider, SqliteHistory};
use slircb::network::upstream::NetworkSession;
use slircb::network::Acceptor;
use slircb::state::{status_prefix, Bouncer, User, UserTable};
use slircb::store::{hash_password, DataStore, SqliteStore, UserRecord};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "slircb.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    let source = config.bouncer.source.clone();
    info!(source = %source, "Starting slircb");

    // Open the user store
    let store = Arc::new(SqliteStore::new(&config.storage.path).await?);

    // Maintenance entry point: `slircb <config> adduser <name> <password>`
    if std::env::args().nth(2).as_deref() == Some("adduser") {
        return adduser(store.as_ref()).await;
    }

    // Wire the event bus. Registration happens only here, before the bus is
    // frozen behind an Arc; everything after publishes only.
    let users = Arc::new(UserTable::new());
    let (admin_tx, admin_rx) = control::admin_channel();

    let mut bus = EventBus::new();
    control::register(&mut bus, Arc::clone(&users), admin_tx, &source);

    let provider: Arc<dyn HistoryProvider> = if config.history.enabled {
        info!(path = %config.history.path, "History recording enabled");
        Arc::new(SqliteHistory::new(&config.history.path).await?)
    } else {
        Arc::new(NoOpProvider)
    };
    history::wire_recorder(&mut bus, provider);

    bus.register(EventName::NetworkState, |event| {
        if let Event::NetworkState {
            user,
            network,
            state,
        } = event
        {
            info!(user = %user, network = %network, state = %state, "Network state changed");
        }
    });

    let bus = Arc::new(bus);

    control::spawn_admin_task(
        admin_rx,
        Arc::clone(&store) as Arc<dyn DataStore>,
        Arc::clone(&bus),
        source.clone(),
    );

    // Materialize every persisted user and start each network's connection
    // attempt, independently of any client being attached.
    let records = store.list_all_users().await?;
    info!(count = records.len(), "Loaded users");
    for record in &records {
        let user = Arc::new(User::from_record(record));
        for network_record in &record.networks {
            let cfg = user.network_config(network_record);
            let handle = NetworkSession::spawn(cfg, Arc::clone(&bus), status_prefix(&source));
            handle.request_connect();
            user.add_network(handle);
        }
        users.insert(user);
    }

    let bouncer = Arc::new(Bouncer::new(source, users, bus));

    // Bind listeners and run until a termination signal.
    let acceptor = Acceptor::bind(&config.listen).await?;
    acceptor.run(bouncer).await?;

    Ok(())
}

/// Create a user record from the command line so a fresh install is usable.
async fn adduser(store: &SqliteStore) -> anyhow::Result<()> {
    let name = std::env::args()
        .nth(3)
        .ok_or_else(|| anyhow::anyhow!("usage: slircb <config> adduser <name> <password>"))?;
    let password = std::env::args()
        .nth(4)
        .ok_or_else(|| anyhow::anyhow!("usage: slircb <config> adduser <name> <password>"))?;

    let name =
        slircb_proto::clean_name(&name).map_err(|e| anyhow::anyhow!("bad user name: {}", e))?;

    let record = UserRecord {
        id: name.clone(),
        password_hash: hash_password(&password)?,
        default_nick: name.clone(),
        default_username: name.clone(),
        default_realname: name.clone(),
        networks: Vec::new(),
    };
    store.create_user(&record).await?;

    info!(user = %name, "User created");
    Ok(())
}
