use serde::Serialize;
use supportdesk_core::access;
use supportdesk_core::domain::ticket::Ticket;
use supportdesk_core::domain::viewer::{Role, Viewer};
use supportdesk_core::store::TicketStore;
use supportdesk_db::SqlTicketStore;

use crate::commands::{load_config, open_migrated_pool, runtime, CommandFailure, CommandResult};

#[derive(Clone, Debug)]
pub struct ViewerArgs {
    pub role: String,
    pub zone: String,
    pub name: String,
    pub customer_identity: Option<String>,
}

impl ViewerArgs {
    fn viewer(&self) -> Viewer {
        let viewer = Viewer::new(
            format!("cli-{}", self.name),
            Role::parse(&self.role),
            self.zone.clone(),
            self.name.clone(),
        );
        match &self.customer_identity {
            Some(identity) => viewer.with_customer_identity(identity.clone()),
            None => viewer,
        }
    }
}

#[derive(Debug, Serialize)]
struct VisibleTickets {
    role: String,
    zone: String,
    name: String,
    count: usize,
    tickets: Vec<Ticket>,
}

/// Lists the tickets the described viewer may see.
pub fn run(args: ViewerArgs) -> CommandResult {
    let config = match load_config("tickets") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("tickets") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let viewer = args.viewer();

    let result: Result<Vec<Ticket>, CommandFailure> = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        let listed = SqlTicketStore::new(pool.clone())
            .list()
            .await
            .map_err(|error| ("ticket_store", error.to_string(), 5u8));
        pool.close().await;
        Ok(access::scope(&viewer, listed?))
    });

    match result {
        Ok(tickets) => CommandResult::report(
            "tickets",
            &VisibleTickets {
                role: viewer.role.as_str().to_string(),
                zone: viewer.zone.clone(),
                name: viewer.name.clone(),
                count: tickets.len(),
                tickets,
            },
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("tickets", error_class, message, exit_code)
        }
    }
}
