use std::{env, error::Error, io, process::ExitCode};

use clap::{Parser, Subcommand, ValueEnum};

use budgeteur_client::{
    AmountRange, BudgeteurClient, Category, ClientConfig, Direction, LogInData, NewTransaction,
    QueryState, RegisterData, SortOrder, Transaction, TransactionFilters, TransactionId,
    TransactionType, TransactionUpdate, TransactionsPage, format_currency, format_date,
    format_signed_amount, setup_logging,
};

const PASSWORD_VAR: &str = "BUDGETEUR_PASSWORD";

/// A command line client for the Budgeteur API.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The API base URL. Defaults to the URL for BUDGETEUR_ENV.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// The email to log in with.
    #[arg(long, env = "BUDGETEUR_EMAIL", global = true)]
    email: Option<String>,

    /// Log more, repeat for even more.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the logged in user.
    Whoami,
    /// List transactions, newest first.
    List {
        /// Transactions per page.
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// The page to show, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Search, filter and sort transactions.
    Search {
        /// Text to look for in descriptions and notes.
        #[arg(long)]
        query: Option<String>,
        /// Only show these categories. Repeat to pick more than one.
        #[arg(long)]
        category: Vec<Category>,
        /// How to sort the results.
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
        /// The smallest amount to show.
        #[arg(long)]
        min: Option<f64>,
        /// The largest amount to show.
        #[arg(long)]
        max: Option<f64>,
        /// Transactions per page.
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// The page to show, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show one transaction.
    Show {
        /// The transaction ID.
        id: String,
    },
    /// Record a transaction.
    Add {
        /// The amount, always positive.
        #[arg(long)]
        amount: f64,
        /// "income" or "expense".
        #[arg(long = "type")]
        transaction_type: TransactionType,
        /// The category key, see `categories`.
        #[arg(long)]
        category: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Change a transaction. Only the given fields are changed.
    Update {
        /// The transaction ID.
        id: String,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long = "type")]
        transaction_type: Option<TransactionType>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete a transaction.
    Delete {
        /// The transaction ID.
        id: String,
    },
    /// Create an account for --email.
    Register {
        /// Your display name.
        #[arg(long)]
        name: String,
    },
    /// List the categories for each transaction type.
    Categories,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    AmountAsc,
    AmountDesc,
    DateAsc,
    DateDesc,
}

impl From<SortArg> for SortOrder {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::AmountAsc => SortOrder::ByAmount(Direction::Ascending),
            SortArg::AmountDesc => SortOrder::ByAmount(Direction::Descending),
            SortArg::DateAsc => SortOrder::ByDate(Direction::Ascending),
            SortArg::DateDesc => SortOrder::ByDate(Direction::Descending),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    setup_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            print_error(error);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.base_url {
        Some(base_url) => ClientConfig::for_base_url(base_url),
        None => ClientConfig::from_env()?,
    };
    tracing::debug!("Using the {} API at {}", config.environment, config.base_url);
    let client = BudgeteurClient::new(config)?;

    let command = match args.command {
        Command::Categories => {
            print_categories();
            return Ok(());
        }
        Command::Register { name } => {
            let email = required_email(args.email)?;
            let password = read_new_password()?;
            let response = client
                .register(&RegisterData {
                    name,
                    email,
                    password,
                })
                .await?;
            println!(
                "{}",
                response
                    .message
                    .unwrap_or_else(|| "Account created.".to_owned())
            );
            return Ok(());
        }
        command => command,
    };

    let email = required_email(args.email)?;
    let password = read_password()?;
    client.log_in(&LogInData { email, password }).await?;

    match command {
        Command::Whoami => match client.session().check().await.user {
            Some(user) => println!("{} <{}>", user.name, user.email),
            None => println!("Not logged in."),
        },
        Command::List { limit, page } => {
            let filters = page_filters(TransactionFilters::new(), limit, page)?;
            print_page(client.transactions().load_page(&filters).await)?;
        }
        Command::Search {
            query,
            category,
            sort,
            min,
            max,
            limit,
            page,
        } => {
            let mut filters = TransactionFilters::new();
            if let Some(query) = query {
                filters.set_search(&query);
            }
            filters.set_categories(category);
            if let Some(sort) = sort {
                filters.set_sort(sort.into());
            }
            filters.set_amount_range(Some(AmountRange { min, max }));

            let filters = page_filters(filters, limit, page)?;
            print_page(client.transactions().load_page(&filters).await)?;
        }
        Command::Show { id } => {
            let id = TransactionId::new(id);
            match client.transactions().get(Some(&id)).await {
                QueryState::Ready(transaction) => print_transaction(&transaction),
                QueryState::Failed(error) => return Err(error.into()),
                QueryState::Disabled => return Err("a transaction ID is required".into()),
            }
        }
        Command::Add {
            amount,
            transaction_type,
            category,
            description,
            note,
        } => {
            let mut transaction = NewTransaction::new(amount, transaction_type, &category)?;
            if let Some(description) = description {
                transaction = transaction.description(&description);
            }
            if let Some(note) = note {
                transaction = transaction.note(&note);
            }

            let response = client.transactions().create(&transaction).await?;
            match response.transaction {
                Some(created) => print_transaction(&created),
                None => println!(
                    "{}",
                    response
                        .message
                        .unwrap_or_else(|| "Transaction created.".to_owned())
                ),
            }
        }
        Command::Update {
            id,
            amount,
            transaction_type,
            category,
            description,
            note,
        } => {
            let mut update = TransactionUpdate::new();
            if let Some(amount) = amount {
                update = update.amount(amount)?;
            }
            if let Some(transaction_type) = transaction_type {
                update = update.transaction_type(transaction_type);
            }
            if let Some(category) = category {
                update = update.category(&category)?;
            }
            if let Some(description) = description {
                update = update.description(&description);
            }
            if let Some(note) = note {
                update = update.note(&note);
            }
            if update.is_empty() {
                return Err("nothing to update, pass at least one field to change".into());
            }

            let response = client
                .transactions()
                .update(&TransactionId::new(id), &update)
                .await?;
            println!(
                "{}",
                response
                    .message
                    .unwrap_or_else(|| "Transaction updated.".to_owned())
            );
        }
        Command::Delete { id } => {
            let response = client
                .transactions()
                .delete(&TransactionId::new(id))
                .await?;
            println!(
                "{}",
                response
                    .message
                    .unwrap_or_else(|| "Transaction deleted.".to_owned())
            );
        }
        Command::Register { .. } | Command::Categories => {}
    }

    Ok(())
}

fn page_filters(
    mut filters: TransactionFilters,
    limit: u32,
    page: u32,
) -> Result<TransactionFilters, Box<dyn Error>> {
    filters.set_page_size(limit)?;
    for _ in 1..page {
        filters.next_page();
    }

    Ok(filters)
}

fn required_email(email: Option<String>) -> Result<String, Box<dyn Error>> {
    email
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| "an email is required, pass --email or set BUDGETEUR_EMAIL".into())
}

fn read_password() -> Result<String, Box<dyn Error>> {
    if let Ok(password) = env::var(PASSWORD_VAR) {
        return Ok(password);
    }

    prompt("Password: ")
}

fn read_new_password() -> Result<String, Box<dyn Error>> {
    if let Ok(password) = env::var(PASSWORD_VAR) {
        return Ok(password);
    }

    loop {
        let first = prompt("Choose a password: ")?;
        let second = prompt("Confirm the password: ")?;

        if first == second {
            return Ok(first);
        }

        print_error("The passwords do not match, try again.");
    }
}

fn prompt(message: &str) -> Result<String, Box<dyn Error>> {
    match rpassword::prompt_password(message) {
        Ok(password) => Ok(password),
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
            Err("no password given".into())
        }
        Err(error) => Err(format!("Could not read password from stdin: {error}").into()),
    }
}

fn print_page(page: TransactionsPage) -> Result<(), Box<dyn Error>> {
    if let Some(error) = page.error {
        return Err(error.message_or("Failed to load transactions").into());
    }

    if page.transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<13} {:>14}  {:<18} Description",
        "ID", "Date", "Amount", "Category"
    );
    for transaction in &page.transactions {
        println!(
            "{:<12} {:<13} {:>14}  {:<18} {}",
            transaction.id,
            format_date(transaction.created),
            format_signed_amount(transaction.amount, transaction.transaction_type),
            category_label(&transaction.category),
            transaction.description.as_deref().unwrap_or("")
        );
    }

    println!();
    if page.has_more {
        println!("Page {}, more pages available.", page.current_page);
    } else {
        println!("Page {}.", page.current_page);
    }

    Ok(())
}

fn print_transaction(transaction: &Transaction) {
    println!("ID:          {}", transaction.id);
    println!("Type:        {}", transaction.transaction_type);
    println!("Amount:      {}", format_currency(transaction.amount));
    println!("Category:    {}", category_label(&transaction.category));
    if let Some(description) = &transaction.description {
        println!("Description: {description}");
    }
    if let Some(note) = &transaction.note {
        println!("Note:        {note}");
    }
    println!("Created:     {}", format_date(transaction.created));
    println!("Updated:     {}", format_date(transaction.updated));
}

fn print_categories() {
    for transaction_type in [TransactionType::Expense, TransactionType::Income] {
        println!("{transaction_type}:");
        for category in Category::for_type(transaction_type) {
            println!("  {:<14} {}", category.key(), category.label());
        }
    }
}

/// The label for known category keys, the key itself otherwise.
fn category_label(key: &str) -> String {
    key.parse::<Category>()
        .map(|category| category.label().to_owned())
        .unwrap_or_else(|_| key.to_owned())
}

fn print_error(error: impl ToString) {
    eprintln!(
        "\x1b[31;1m{}\x1b[0m",
        capitalise_first_char(&error.to_string())
    )
}

fn capitalise_first_char(string: &str) -> String {
    let mut chars = string.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    first.to_uppercase().chain(chars).collect()
}
