use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use listenfd::ListenFd;
use mimalloc::MiMalloc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use garcon::{handle_connection, AnyResult, DirectoryStore, ReadLimits, ServerData};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Minimal HTTP/1.1 server: echo, user-agent and a flat file store.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Directory served and written by `/files/*`. File routes answer 404 without it.
    #[arg(long)]
    directory: Option<PathBuf>,

    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    host: IpAddr,

    #[arg(long, default_value_t = 4221)]
    port: u16,

    /// How long a client gets to send its whole request.
    #[arg(long, default_value_t = 5_000)]
    read_timeout_ms: u64,

    #[arg(long, default_value_t = 8 * 1024)]
    max_head_bytes: usize,

    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    max_body_bytes: usize,
}

impl Args {
    fn server_data(&self) -> ServerData {
        let limits = ReadLimits {
            timeout: Duration::from_millis(self.read_timeout_ms),
            max_head_bytes: self.max_head_bytes,
            max_body_bytes: self.max_body_bytes,
        };
        ServerData::new(self.directory.clone().map(DirectoryStore::new)).with_limits(limits)
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "garcon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    run(args).await
}

/// Takes a socket passed down by systemfd/systemd, or binds one.
async fn listener(addr: SocketAddr) -> AnyResult<TcpListener> {
    let mut listenfd = ListenFd::from_env();
    if let Some(std_listener) = listenfd.take_tcp_listener(0)? {
        std_listener.set_nonblocking(true)?;
        return Ok(TcpListener::from_std(std_listener)?);
    }

    TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind to {addr}"))
}

async fn run(args: Args) -> AnyResult<()> {
    let server_data = args.server_data();
    let socket = listener(SocketAddr::new(args.host, args.port)).await?;

    info!(
        addr = %socket.local_addr()?,
        directory = ?args.directory,
        "listening"
    );

    loop {
        let (mut stream, peer) = tokio::select! {
            accepted = socket.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(%err, "failed to accept connection");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        };

        let server_data = server_data.clone();
        tokio::spawn(
            async move {
                if let Err(err) = handle_connection(&server_data, &mut stream).await {
                    error!(err = ?err, "exchange failed");
                }
                if let Err(err) = stream.shutdown().await {
                    debug!(%err, "shutdown failed");
                }
            }
            .instrument(info_span!("connection", %peer)),
        );
    }
}
