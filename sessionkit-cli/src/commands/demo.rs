//! `sessionkit demo`: connect to the simulated server and run flows.

use std::collections::HashMap;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use sessionkit_core::preferences::FilePreferences;
use sessionkit_core::sdk::memory::MemoryIdentitySdk;
use sessionkit_core::{ResponseStatus, ServerRequest, Session};
use tracing::info;

use super::{FixedSelfie, LogObserver};
use crate::counterpart::{self, SERVER_ADDRESS};
use crate::Context;

/// A flow the demo can drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DemoFlow {
    /// Liveness authentication
    Auth,
    /// Share the stored email credential
    ShareEmail,
    /// Share a document credential (none stored, so it is rejected)
    ShareDocument,
    /// Share a custom credential
    ShareCustom,
    /// Sign the server's agreement
    DocumentSigning,
    /// Receive and store a server-issued credential
    CustomCredential,
    /// Answer an unsolicited signing request
    Signing,
}

impl DemoFlow {
    const ALL: [Self; 7] = [
        Self::Auth,
        Self::ShareEmail,
        Self::ShareDocument,
        Self::CustomCredential,
        Self::ShareCustom,
        Self::DocumentSigning,
        Self::Signing,
    ];

    const fn server_request(self) -> Option<ServerRequest> {
        match self {
            Self::Auth => Some(ServerRequest::Auth),
            Self::ShareEmail => Some(ServerRequest::ShareEmail),
            Self::ShareDocument => Some(ServerRequest::ShareDocument),
            Self::ShareCustom => Some(ServerRequest::ShareCustom),
            Self::DocumentSigning => Some(ServerRequest::DocumentSigning),
            Self::CustomCredential => Some(ServerRequest::GetCustomCredential),
            Self::Signing => None,
        }
    }
}

/// Arguments for `sessionkit demo`.
#[derive(Args)]
pub struct DemoArgs {
    /// Flows to run, in order (default: all)
    #[arg(short, long, value_enum, value_delimiter = ',')]
    flows: Vec<DemoFlow>,

    /// Connect through a discovery QR payload instead of by address
    #[arg(long)]
    qr: bool,

    /// Reject every incoming request
    #[arg(long)]
    reject: bool,

    /// Keep the server preference after the demo instead of disconnecting
    #[arg(long)]
    stay_connected: bool,
}

/// Runs the demo.
///
/// # Errors
///
/// Returns an error if any session operation fails.
pub async fn run(context: &Context, args: &DemoArgs) -> eyre::Result<()> {
    let sdk = Arc::new(
        MemoryIdentitySdk::new().with_credentials(vec![counterpart::email_credential()]),
    );
    let preferences = Arc::new(FilePreferences::new(context.preferences_path())?);
    let session = Session::new(context.config.clone(), sdk.clone(), preferences);
    session.set_observer(Arc::new(LogObserver));
    let config = session.config();
    info!(
        environment = %config.environment,
        request_timeout = ?config.request_timeout(),
        "session created"
    );

    session.initialize().await?;
    session
        .register_with_liveness(FixedSelfie::new(super::SELFIE))
        .await?;
    let account = session.identity().address;
    sdk.set_send_hook(counterpart::server(account.clone()));
    info!(%account, "account registered");

    let group_address = if args.qr {
        let qr = MemoryIdentitySdk::discovery_qr(SERVER_ADDRESS, config.environment.is_sandbox());
        session.connect_with_qr(qr).await?
    } else if let Some(group_address) = session.resume_connection().await? {
        info!("resumed the connection a previous demo left behind");
        group_address
    } else {
        let info = HashMap::from([("client".to_string(), "sessionkit-cli".to_string())]);
        session.connect(SERVER_ADDRESS.to_string(), info).await?
    };
    info!(%group_address, "connected to {SERVER_ADDRESS}");

    let status = if args.reject {
        ResponseStatus::Rejected
    } else {
        ResponseStatus::Accepted
    };
    let flows = if args.flows.is_empty() {
        DemoFlow::ALL.to_vec()
    } else {
        args.flows.clone()
    };
    for flow in flows {
        run_flow(&session, &sdk, &account, flow, status).await?;
        session.reset_flow();
    }

    println!(
        "{}",
        serde_json::json!({
            "account": account,
            "server": SERVER_ADDRESS,
            "group": group_address,
            "messages_sent": sdk.sent().len(),
            "stored_credentials": sdk.stored_credentials().len(),
        })
    );

    if args.stay_connected {
        info!(
            "leaving server preference in {}",
            context.preferences_path().display()
        );
    } else {
        session.disconnect()?;
    }
    Ok(())
}

async fn run_flow(
    session: &Session,
    sdk: &MemoryIdentitySdk,
    account: &str,
    flow: DemoFlow,
    status: ResponseStatus,
) -> eyre::Result<()> {
    if let Some(request) = flow.server_request() {
        let pending = session.notify_server_for_request(request).await?;
        info!(
            correlation_id = %pending.correlation_id,
            kind = %pending.kind,
            "{flow:?}: server notified"
        );
    } else if !sdk.emit(counterpart::signing_request(account)) {
        eyre::bail!("{flow:?}: session is not subscribed to requests");
    }

    let snapshot = session.snapshot();
    if let Some(request) = snapshot.credential_request {
        let sent = if flow == DemoFlow::Auth && status == ResponseStatus::Accepted {
            session
                .respond_with_liveness(request.id, FixedSelfie::new(super::SELFIE))
                .await?
        } else {
            session.share_credentials(request.id, status).await?
        };
        info!(%sent, "{flow:?}: credential response sent");
    } else if let Some(request) = snapshot.verification_request {
        let sent = session.send_doc_sign_response(request.id, status).await?;
        info!(%sent, "{flow:?}: agreement answered");
    } else if let Some(request) = snapshot.signing_request {
        let sent = session.respond_to_signing_request(request.id, status).await?;
        info!(%sent, "{flow:?}: signing request answered");
    } else if snapshot.received_credentials > 0 {
        let stored = session.store_received_credentials()?;
        info!(stored, "{flow:?}: received credentials stored");
    } else {
        eyre::bail!("{flow:?}: server did not answer ({})", snapshot.flow_state);
    }
    Ok(())
}
