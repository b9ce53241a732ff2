use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use helpdesk_crm::auth::{OAuthProvider, Session};
use helpdesk_crm::error::{Error, Result};
use helpdesk_crm::models::{
    CustomerStatus, EmployeeRole, NewComment, NewCustomer, NewTicket, TicketPriority, TicketStatus,
};
use helpdesk_crm::tickets::TicketQuery;
use helpdesk_crm::Crm;

#[derive(Parser, Debug)]
#[command(name = "crm", version)]
#[command(about = "Operate the helpdesk CRM from the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Access token of a signed-in agent (see `crm session`)
    #[arg(long, env = "CRM_ACCESS_TOKEN", global = true, hide_env_values = true)]
    access_token: Option<String>,

    /// Print JSON instead of tab-separated text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the URL that starts an OAuth sign-in
    LoginUrl {
        #[arg(long, value_enum, default_value = "google")]
        provider: Provider,
        #[arg(long)]
        redirect_to: Option<String>,
    },
    /// Read the session out of the URL the sign-in redirected to
    Session { redirect_url: String },
    #[command(subcommand)]
    Tickets(TicketCommand),
    #[command(subcommand)]
    Comments(CommentCommand),
    #[command(subcommand)]
    Customers(CustomerCommand),
    #[command(subcommand)]
    Employees(EmployeeCommand),
    /// Every account with its employee and customer records
    Users,
    /// Ticket metrics for a trailing window
    Dashboard {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Provider {
    Google,
    Github,
    Azure,
}

impl From<Provider> for OAuthProvider {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Google => OAuthProvider::Google,
            Provider::Github => OAuthProvider::Github,
            Provider::Azure => OAuthProvider::Azure,
        }
    }
}

#[derive(Args, Debug)]
struct Paging {
    #[arg(long, default_value_t = 0)]
    page: u64,
    #[arg(long, default_value_t = 10)]
    rows: u64,
}

#[derive(Subcommand, Debug)]
enum TicketCommand {
    List {
        #[command(flatten)]
        paging: Paging,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<TicketStatus>,
        #[arg(long)]
        priority: Option<TicketPriority>,
    },
    Show { id: String },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        customer: String,
        #[arg(long, default_value = "medium")]
        priority: TicketPriority,
        #[arg(long)]
        assign_to: Option<String>,
    },
    Status { id: String, status: TicketStatus },
    /// Assign a ticket; leave out the user to unassign
    Assign { id: String, user: Option<String> },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum CommentCommand {
    List { ticket: String },
    Add {
        ticket: String,
        text: String,
        /// Hide the comment from the customer
        #[arg(long)]
        internal: bool,
    },
    Delete { ticket: String, id: String },
}

#[derive(Subcommand, Debug)]
enum CustomerCommand {
    List {
        #[command(flatten)]
        paging: Paging,
        #[arg(long, default_value = "")]
        search: String,
    },
    Show { id: String },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long, default_value = "lead")]
        status: CustomerStatus,
    },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum EmployeeCommand {
    List,
    Promote {
        user_id: String,
        #[arg(long, default_value = "support")]
        role: EmployeeRole,
    },
    Remove { id: String },
}

fn print<T: Serialize>(json: bool, value: &T, lines: impl FnOnce(&T) -> Vec<String>) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        for line in lines(value) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn current_user_id(crm: &Crm) -> Result<String> {
    crm.auth()
        .get_session()
        .and_then(|s| s.user_id().map(str::to_string))
        .ok_or(Error::MissingSession)
}

async fn tickets(crm: &Crm, command: TicketCommand, json: bool) -> Result<()> {
    let tickets = crm.tickets();
    match command {
        TicketCommand::List {
            paging,
            search,
            status,
            priority,
        } => {
            let page = tickets
                .list(&TicketQuery {
                    page: paging.page,
                    rows_per_page: paging.rows,
                    search,
                    status,
                    priority,
                })
                .await?;
            print(json, &page, |page| {
                let mut lines: Vec<String> = page
                    .tickets
                    .iter()
                    .map(|t| {
                        format!(
                            "{}\t{}\t{}\t{}\t{}\t{}",
                            t.id,
                            t.created_at.format("%Y-%m-%d"),
                            t.status,
                            t.priority,
                            or_dash(t.customer.as_ref().map(|c| c.name.as_str())),
                            t.title
                        )
                    })
                    .collect();
                lines.push(format!("{} tickets", page.total_count));
                lines
            })
        }
        TicketCommand::Show { id } => {
            let ticket = tickets.get(&id).await?;
            print(json, &ticket, |t| {
                vec![
                    format!("title\t{}", t.title),
                    format!("status\t{}", t.status),
                    format!("priority\t{}", t.priority),
                    format!("customer\t{}", or_dash(t.customer.as_ref().map(|c| c.name.as_str()))),
                    format!(
                        "assigned\t{}",
                        or_dash(t.assigned_to.as_ref().map(|p| p.full_name.as_str()))
                    ),
                    format!("created\t{}", t.created_at.to_rfc3339()),
                    format!("description\t{}", or_dash(t.description.as_deref())),
                ]
            })
        }
        TicketCommand::Create {
            title,
            description,
            customer,
            priority,
            assign_to,
        } => {
            let ticket = NewTicket {
                title,
                description,
                priority,
                customer_id: customer,
                assigned_to: assign_to,
                created_by: None,
            };
            let created = if crm.auth().get_session().is_some() {
                tickets.create_as_current_user(&ticket).await?
            } else {
                tickets.create(&ticket).await?
            };
            print(json, &created, |t| vec![t.id.clone()])
        }
        TicketCommand::Status { id, status } => tickets.update_status(&id, status).await,
        TicketCommand::Assign { id, user } => tickets.assign(&id, user.as_deref()).await,
        TicketCommand::Delete { id } => tickets.delete(&id).await,
    }
}

async fn comments(crm: &Crm, command: CommentCommand, json: bool) -> Result<()> {
    let comments = crm.comments();
    match command {
        CommentCommand::List { ticket } => {
            let thread = comments.list(&ticket).await?;
            print(json, &thread, |thread| {
                thread
                    .iter()
                    .map(|c| {
                        format!(
                            "{}\t{}\t{}\t{}{}",
                            c.id,
                            c.created_at.format("%Y-%m-%d %H:%M"),
                            or_dash(c.user.as_ref().map(|u| u.full_name.as_str())),
                            if c.is_internal { "[internal] " } else { "" },
                            c.comment
                        )
                    })
                    .collect()
            })
        }
        CommentCommand::Add {
            ticket,
            text,
            internal,
        } => {
            comments
                .add(&NewComment {
                    ticket_id: ticket,
                    user_id: current_user_id(crm)?,
                    comment: text,
                    is_internal: internal,
                })
                .await
        }
        CommentCommand::Delete { ticket, id } => comments.delete(&id, &ticket).await,
    }
}

async fn customers(crm: &Crm, command: CustomerCommand, json: bool) -> Result<()> {
    let customers = crm.customers();
    match command {
        CustomerCommand::List { paging, search } => {
            let page = customers.search(&search, paging.page, paging.rows).await?;
            print(json, &page.rows, |rows| {
                let mut lines: Vec<String> = rows
                    .iter()
                    .map(|c| {
                        format!(
                            "{}\t{}\t{}\t{}\t{}",
                            c.id,
                            c.name,
                            c.email,
                            or_dash(c.company_name.as_deref()),
                            c.status
                        )
                    })
                    .collect();
                lines.push(format!("{} customers", page.total));
                lines
            })
        }
        CustomerCommand::Show { id } => {
            let customer = customers.get(&id).await?;
            print(json, &customer, |c| {
                vec![
                    format!("name\t{}", c.name),
                    format!("email\t{}", c.email),
                    format!("phone\t{}", or_dash(c.phone.as_deref())),
                    format!("company\t{}", or_dash(c.company_name.as_deref())),
                    format!("status\t{}", c.status),
                    format!(
                        "assigned\t{}",
                        or_dash(c.assigned_to.as_ref().map(|p| p.full_name.as_str()))
                    ),
                    format!("notes\t{}", or_dash(c.notes.as_deref())),
                ]
            })
        }
        CustomerCommand::Create {
            name,
            email,
            phone,
            company,
            status,
        } => {
            let created = customers
                .create(&NewCustomer {
                    name,
                    email,
                    phone,
                    company_name: company,
                    status,
                    ..Default::default()
                })
                .await?;
            print(json, &created, |c| vec![c.id.clone()])
        }
        CustomerCommand::Delete { id } => customers.delete(&id).await,
    }
}

async fn employees(crm: &Crm, command: EmployeeCommand, json: bool) -> Result<()> {
    let employees = crm.employees();
    match command {
        EmployeeCommand::List => {
            let roster = employees.roster().await?;
            print(json, &roster, |roster| {
                roster
                    .iter()
                    .map(|m| {
                        format!(
                            "{}\t{}\t{}\t{}",
                            m.user.id,
                            m.user.email(),
                            m.user.display_name(),
                            or_dash(m.employee.as_ref().map(|e| e.role.as_str()))
                        )
                    })
                    .collect()
            })
        }
        EmployeeCommand::Promote { user_id, role } => {
            let user = employees
                .auth_users()
                .await?
                .into_iter()
                .find(|u| u.id == user_id)
                .ok_or_else(|| Error::not_found(format!("no account with id {}", user_id)))?;
            employees.promote(&user, Some(role)).await
        }
        EmployeeCommand::Remove { id } => employees.remove(&id).await,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let crm = Crm::from_env()?;
    if let Some(token) = cli.access_token.as_deref() {
        crm.auth()
            .set_session(Session::from_tokens(token.to_string(), String::new(), 3600, None)?);
    }

    match cli.command {
        Commands::LoginUrl {
            provider,
            redirect_to,
        } => {
            println!(
                "{}",
                crm.auth()
                    .sign_in_with_oauth_url(provider.into(), redirect_to.as_deref())
            );
            Ok(())
        }
        Commands::Session { redirect_url } => {
            let session = crm.auth().session_from_redirect(&redirect_url)?;
            print(cli.json, &session, |s| {
                vec![
                    format!("user\t{}", or_dash(s.user_id())),
                    format!(
                        "email\t{}",
                        or_dash(s.user.as_ref().and_then(|u| u.email.as_deref()))
                    ),
                    format!("access_token\t{}", s.access_token),
                ]
            })
        }
        Commands::Tickets(command) => tickets(&crm, command, cli.json).await,
        Commands::Comments(command) => comments(&crm, command, cli.json).await,
        Commands::Customers(command) => customers(&crm, command, cli.json).await,
        Commands::Employees(command) => employees(&crm, command, cli.json).await,
        Commands::Users => {
            let entries = crm.users().overview().await?;
            print(cli.json, &entries, |entries| {
                entries
                    .iter()
                    .map(|e| {
                        format!(
                            "{}\t{}\t{}\t{}\t{}",
                            e.user.id,
                            e.user.email(),
                            e.user.display_name(),
                            or_dash(e.employee.as_ref().map(|emp| emp.role.as_str())),
                            or_dash(e.customer.as_ref().map(|c| c.status.as_str()))
                        )
                    })
                    .collect()
            })
        }
        Commands::Dashboard { days } => {
            let dashboard = crm.dashboard();
            let stats = dashboard.stats(days).await?;
            let by_priority = dashboard.tickets_by_priority(days).await?;
            let by_status = dashboard.tickets_by_status(days).await?;

            let report = serde_json::json!({
                "stats": stats,
                "by_priority": by_priority,
                "by_status": by_status,
            });
            print(cli.json, &report, |_| {
                let mut lines = vec![
                    format!("total\t{}", stats.total_tickets),
                    format!("open\t{}", stats.open_tickets),
                    format!("resolved\t{}", stats.resolved_tickets),
                    format!("resolution_rate\t{:.1}%", stats.resolution_rate),
                    format!("avg_response_hours\t{:.1}", stats.avg_response_hours),
                ];
                lines.extend(by_priority.iter().map(|p| format!("priority:{}\t{}", p.priority, p.count)));
                lines.extend(by_status.iter().map(|s| format!("status:{}\t{}", s.status, s.count)));
                lines
            })
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}
