use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use meta_ads_core::auth::{
    AuthError, AuthManager, CredentialStore, FileCredentialStore, Profile,
};
use meta_ads_core::graph::{
    AdAccount, AdSet, Campaign, CampaignInsights, MetaGraphClient,
};
use tokio::task;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Meta Ads terminal CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configure a new profile with Meta app credentials
    Setup,
    /// Authenticate with Meta and obtain a long-lived access token
    Auth(AuthArgs),
    /// Clear stored tokens for a profile
    Logout(ProfileArgs),
    /// Display the stored configuration
    Config(ProfileArgs),
    /// Manage profiles
    #[command(subcommand)]
    Profiles(ProfilesCommand),
    /// Show the authenticated user
    Whoami(ProfileArgs),
    /// List accessible ad accounts
    Accounts(AccountsArgs),
    /// Get details of a specific ad account
    Account(AccountArgs),
    /// List campaigns for an ad account
    Campaigns(CampaignsArgs),
    /// Get details of a specific campaign
    Campaign(CampaignArgs),
    /// List ad sets for a campaign
    Adsets(AdsetsArgs),
}

#[derive(Subcommand, Debug)]
enum ProfilesCommand {
    /// List all profiles
    List,
    /// Switch the active profile
    Switch {
        /// Profile to activate
        name: String,
    },
    /// Delete a profile
    Delete {
        /// Profile to remove
        name: String,
    },
}

#[derive(Args, Debug)]
struct AuthArgs {
    /// Profile to authenticate (defaults to the active profile)
    #[arg(short, long)]
    profile: Option<String>,
    /// Print the authorization URL without launching a browser
    #[arg(long = "no-browser")]
    no_browser: bool,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Profile name (defaults to the active profile)
    #[arg(short, long)]
    profile: Option<String>,
}

#[derive(Args, Debug)]
struct AccountsArgs {
    /// Maximum accounts to return
    #[arg(short, long, default_value_t = 50)]
    limit: usize,
    /// Output as JSON
    #[arg(long)]
    json: bool,
    /// Profile to use
    #[arg(short, long)]
    profile: Option<String>,
}

#[derive(Args, Debug)]
struct AccountArgs {
    /// Ad account ID (format: act_XXXXXXXXX)
    account_id: String,
    /// Output as JSON
    #[arg(long)]
    json: bool,
    /// Profile to use
    #[arg(short, long)]
    profile: Option<String>,
}

#[derive(Args, Debug)]
struct CampaignsArgs {
    /// Ad account ID; falls back to the profile default
    #[arg(short, long = "account-id")]
    account_id: Option<String>,
    /// Maximum campaigns to return
    #[arg(short, long, default_value_t = 50)]
    limit: usize,
    /// Output as JSON
    #[arg(long)]
    json: bool,
    /// Profile to use
    #[arg(short, long)]
    profile: Option<String>,
}

#[derive(Args, Debug)]
struct CampaignArgs {
    /// Campaign ID
    campaign_id: String,
    /// Include insights for the last 30 days
    #[arg(long)]
    insights: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
    /// Profile to use
    #[arg(short, long)]
    profile: Option<String>,
}

#[derive(Args, Debug)]
struct AdsetsArgs {
    /// Campaign ID
    campaign_id: String,
    /// Maximum ad sets to return
    #[arg(short, long, default_value_t = 50)]
    limit: usize,
    /// Output as JSON
    #[arg(long)]
    json: bool,
    /// Profile to use
    #[arg(short, long)]
    profile: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Setup => setup().await?,
        Commands::Auth(args) => auth(args).await?,
        Commands::Logout(args) => logout(args).await?,
        Commands::Config(args) => show_config(args)?,
        Commands::Profiles(cmd) => match cmd {
            ProfilesCommand::List => profiles_list()?,
            ProfilesCommand::Switch { name } => profiles_switch(&name)?,
            ProfilesCommand::Delete { name } => profiles_delete(&name)?,
        },
        Commands::Whoami(args) => whoami(args).await?,
        Commands::Accounts(args) => accounts(args).await?,
        Commands::Account(args) => account(args).await?,
        Commands::Campaigns(args) => campaigns(args).await?,
        Commands::Campaign(args) => campaign(args).await?,
        Commands::Adsets(args) => adsets(args).await?,
    }
    Ok(())
}

fn open_store() -> Result<FileCredentialStore> {
    FileCredentialStore::with_default_locator().context("unable to initialise credential store")
}

fn load_profile(name: Option<&str>) -> Result<Profile> {
    let store = open_store()?;
    store.get(name)?.ok_or_else(|| match name {
        Some(name) => anyhow!("profile '{}' not found; run `meta-ads setup` first", name),
        None => anyhow!("no profile configured; run `meta-ads setup` first"),
    })
}

async fn setup() -> Result<()> {
    println!("Setting up a new profile for Meta Ads API access.\n");

    let name = prompt_with_default("Profile name", "default").await?;
    let app_id = prompt_required("Meta App ID").await?;
    let app_secret = prompt_required("Meta App Secret").await?;
    let ad_account_id = prompt_optional("Ad Account ID (optional, format: act_XXXXXXXXX)").await?;

    let mut profile = Profile::new(name, app_id, app_secret);
    if let Some(ad_account_id) = ad_account_id {
        profile = profile.with_ad_account_id(ad_account_id);
    }

    let store = open_store()?;
    store.save(&profile).context("failed to save profile")?;

    println!("\nProfile '{}' saved.", profile.name);
    println!("Next step: meta-ads auth -p {}", profile.name);
    Ok(())
}

async fn auth(args: AuthArgs) -> Result<()> {
    let store = open_store()?;
    let manager = AuthManager::new(store);

    println!("Waiting for authorization (times out after 5 minutes)...");
    let profile = manager
        .authenticate(
            args.profile.as_deref(),
            !args.no_browser,
            print_authorization_url,
        )
        .await
        .context("authentication failed")?;

    println!("Authentication successful for profile '{}'.", profile.name);
    if let Some(days) = profile.days_until_expiry(Utc::now()) {
        println!("Token expires in ~{days} days.");
    }
    Ok(())
}

async fn logout(args: ProfileArgs) -> Result<()> {
    let store = open_store()?;
    let manager = AuthManager::new(store);
    let profile = manager
        .logout(args.profile.as_deref())
        .await
        .context("logout failed")?;
    println!("Logged out from profile '{}'.", profile.name);
    Ok(())
}

fn show_config(args: ProfileArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref())?;

    println!("Configuration: {}", profile.name);
    println!("App ID        : {}", profile.app_id);
    println!("App Secret    : {}", "*".repeat(profile.app_secret.chars().count()));
    println!(
        "Ad Account ID : {}",
        profile.ad_account_id.as_deref().unwrap_or("not set")
    );
    println!(
        "Access Token  : {}",
        if profile.is_authenticated() { "set" } else { "not set" }
    );
    if profile.token_expiry.is_some() {
        let now = Utc::now();
        if profile.token_expired(now) {
            println!("Token Expires : expired");
        } else if let Some(days) = profile.days_until_expiry(now) {
            println!("Token Expires : in {days} days");
        }
    }
    Ok(())
}

fn profiles_list() -> Result<()> {
    let store = open_store()?;
    let profiles = store.list()?;
    if profiles.is_empty() {
        println!("No profiles found. Run `meta-ads setup` first.");
        return Ok(());
    }

    let active = store.active_name()?;
    println!("{:<20} {:<16} {:<14} {}", "NAME", "APP ID", "AUTHENTICATED", "ACTIVE");
    println!("{}", "-".repeat(60));
    for profile in profiles {
        let marker = if active.as_deref() == Some(profile.name.as_str()) {
            "*"
        } else {
            ""
        };
        println!(
            "{:<20} {:<16} {:<14} {}",
            truncate(&profile.name, 20),
            truncate(&profile.app_id, 16),
            if profile.is_authenticated() { "yes" } else { "no" },
            marker
        );
    }
    Ok(())
}

fn profiles_switch(name: &str) -> Result<()> {
    let store = open_store()?;
    store
        .set_active(name)
        .with_context(|| format!("failed to switch to profile '{name}'"))?;
    println!("Switched to profile '{name}'.");
    Ok(())
}

fn profiles_delete(name: &str) -> Result<()> {
    let store = open_store()?;
    store
        .delete(name)
        .with_context(|| format!("failed to delete profile '{name}'"))?;
    println!("Deleted profile '{name}'.");
    Ok(())
}

async fn whoami(args: ProfileArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref())?;
    let client = MetaGraphClient::from_profile(&profile)?;
    let me = client.me().await.context("failed to fetch user")?;
    println!("ID    : {}", me.id);
    println!("Name  : {}", me.name.as_deref().unwrap_or("-"));
    println!("Email : {}", me.email.as_deref().unwrap_or("-"));
    Ok(())
}

async fn accounts(args: AccountsArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref())?;
    let client = MetaGraphClient::from_profile(&profile)?;
    let accounts = client
        .ad_accounts(args.limit)
        .await
        .context("failed to fetch ad accounts")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
    } else if accounts.is_empty() {
        println!("No ad accounts found.");
    } else {
        render_account_list(&accounts);
        println!("\nTotal: {} ad account(s)", accounts.len());
    }
    Ok(())
}

async fn account(args: AccountArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref())?;
    let client = MetaGraphClient::from_profile(&profile)?;
    let account = client
        .ad_account(&args.account_id)
        .await
        .context("failed to fetch ad account")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        render_account_detail(&account);
    }
    Ok(())
}

async fn campaigns(args: CampaignsArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref())?;
    let account_id = args
        .account_id
        .or_else(|| profile.ad_account_id.clone())
        .ok_or_else(|| {
            anyhow!("ad account ID required; provide --account-id or set it in your profile")
        })?;

    let client = MetaGraphClient::from_profile(&profile)?;
    let campaigns = client
        .campaigns(&account_id, args.limit)
        .await
        .context("failed to fetch campaigns")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&campaigns)?);
    } else if campaigns.is_empty() {
        println!("No campaigns found.");
    } else {
        render_campaign_list(&campaigns);
        println!("\nTotal: {} campaign(s)", campaigns.len());
    }
    Ok(())
}

async fn campaign(args: CampaignArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref())?;
    let client = MetaGraphClient::from_profile(&profile)?;
    let campaign = client
        .campaign(&args.campaign_id)
        .await
        .context("failed to fetch campaign")?;

    let insights = if args.insights {
        client
            .campaign_insights(&args.campaign_id, "last_30d")
            .await
            .context("failed to fetch insights")?
    } else {
        None
    };

    if args.json {
        let mut value = serde_json::to_value(&campaign)?;
        if let Some(insights) = &insights {
            value["insights"] = serde_json::to_value(insights)?;
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        render_campaign_detail(&campaign);
        if args.insights {
            match &insights {
                Some(insights) => render_insights(insights),
                None => println!("\nNo insights in the last 30 days."),
            }
        }
    }
    Ok(())
}

async fn adsets(args: AdsetsArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_deref())?;
    let client = MetaGraphClient::from_profile(&profile)?;
    let ad_sets = client
        .ad_sets(&args.campaign_id, args.limit)
        .await
        .context("failed to fetch ad sets")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ad_sets)?);
    } else if ad_sets.is_empty() {
        println!("No ad sets found.");
    } else {
        render_adset_list(&ad_sets);
        println!("\nTotal: {} ad set(s)", ad_sets.len());
    }
    Ok(())
}

fn print_authorization_url(url: &Url) -> Result<(), AuthError> {
    println!("\nIf the browser does not open automatically, visit:\n  {url}\n");
    Ok(())
}

async fn prompt_with_default(label: &str, default: &str) -> Result<String> {
    let answer = prompt(format!("{label} [{default}]: ")).await?;
    if answer.is_empty() {
        Ok(default.to_owned())
    } else {
        Ok(answer)
    }
}

async fn prompt_required(label: &str) -> Result<String> {
    loop {
        let answer = prompt(format!("{label}: ")).await?;
        if !answer.is_empty() {
            return Ok(answer);
        }
        println!("{label} is required.");
    }
}

async fn prompt_optional(label: &str) -> Result<Option<String>> {
    let answer = prompt(format!("{label}: ")).await?;
    Ok(if answer.is_empty() { None } else { Some(answer) })
}

async fn prompt(label: String) -> Result<String> {
    task::spawn_blocking(move || {
        use std::io::{self, Write};
        print!("{label}");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_owned())
    })
    .await
    .context("prompt interrupted")?
}

fn render_account_list(accounts: &[AdAccount]) {
    println!(
        "{:<18} {:<30} {:<10} {:<9} {:<12}",
        "ID", "NAME", "STATUS", "CURRENCY", "BALANCE"
    );
    println!("{}", "-".repeat(84));
    for account in accounts {
        println!(
            "{:<18} {:<30} {:<10} {:<9} {:<12}",
            truncate(&account.id, 18),
            truncate(account.name.as_deref().unwrap_or("-"), 30),
            account_status_label(account.account_status),
            account.currency.as_deref().unwrap_or("-"),
            format_cents(account.balance.as_deref())
        );
    }
}

fn render_account_detail(account: &AdAccount) {
    println!("Ad Account: {}", account.name.as_deref().unwrap_or(&account.id));
    println!("ID          : {}", account.id);
    println!("Status      : {}", account_status_label(account.account_status));
    println!("Currency    : {}", account.currency.as_deref().unwrap_or("-"));
    println!(
        "Timezone    : {}",
        account.timezone_name.as_deref().unwrap_or("-")
    );
    println!("Balance     : {}", format_cents(account.balance.as_deref()));
    println!(
        "Amount Spent: {}",
        format_cents(account.amount_spent.as_deref())
    );
    println!("Spend Cap   : {}", format_cents(account.spend_cap.as_deref()));
}

fn render_campaign_list(campaigns: &[Campaign]) {
    println!(
        "{:<18} {:<28} {:<10} {:<20} {:<14} {:<20}",
        "ID", "NAME", "STATUS", "OBJECTIVE", "DAILY BUDGET", "START TIME"
    );
    println!("{}", "-".repeat(114));
    for campaign in campaigns {
        let budget = match (&campaign.daily_budget, &campaign.lifetime_budget) {
            (Some(daily), _) => format_cents(Some(daily)),
            (None, Some(lifetime)) => format!("{} (LT)", format_cents(Some(lifetime))),
            (None, None) => "-".to_owned(),
        };
        println!(
            "{:<18} {:<28} {:<10} {:<20} {:<14} {:<20}",
            truncate(&campaign.id, 18),
            truncate(campaign.name.as_deref().unwrap_or("-"), 28),
            campaign.status.as_deref().unwrap_or("-"),
            truncate(campaign.objective.as_deref().unwrap_or("-"), 20),
            budget,
            campaign.start_time.as_deref().unwrap_or("-")
        );
    }
}

fn render_campaign_detail(campaign: &Campaign) {
    println!("Campaign: {}", campaign.name.as_deref().unwrap_or(&campaign.id));
    println!("ID              : {}", campaign.id);
    println!("Status          : {}", campaign.status.as_deref().unwrap_or("-"));
    println!(
        "Objective       : {}",
        campaign.objective.as_deref().unwrap_or("-")
    );
    println!(
        "Daily Budget    : {}",
        format_cents(campaign.daily_budget.as_deref())
    );
    println!(
        "Lifetime Budget : {}",
        format_cents(campaign.lifetime_budget.as_deref())
    );
    println!(
        "Bid Strategy    : {}",
        campaign.bid_strategy.as_deref().unwrap_or("-")
    );
    println!(
        "Budget Remaining: {}",
        format_cents(campaign.budget_remaining.as_deref())
    );
    println!(
        "Start Time      : {}",
        campaign.start_time.as_deref().unwrap_or("-")
    );
    println!(
        "Stop Time       : {}",
        campaign.stop_time.as_deref().unwrap_or("ongoing")
    );
}

fn render_insights(insights: &CampaignInsights) {
    println!("\nInsights (last 30 days):");
    println!("Impressions : {}", insights.impressions.as_deref().unwrap_or("0"));
    println!("Clicks      : {}", insights.clicks.as_deref().unwrap_or("0"));
    println!("Spend       : ${:.2}", parse_metric(insights.spend.as_deref()));
    println!("CTR         : {:.2}%", parse_metric(insights.ctr.as_deref()));
    println!("CPC         : ${:.2}", parse_metric(insights.cpc.as_deref()));
    println!("CPM         : ${:.2}", parse_metric(insights.cpm.as_deref()));
    println!("Reach       : {}", insights.reach.as_deref().unwrap_or("0"));
}

fn render_adset_list(ad_sets: &[AdSet]) {
    println!(
        "{:<18} {:<32} {:<10} {:<22} {:<14}",
        "ID", "NAME", "STATUS", "OPTIMIZATION GOAL", "DAILY BUDGET"
    );
    println!("{}", "-".repeat(100));
    for ad_set in ad_sets {
        println!(
            "{:<18} {:<32} {:<10} {:<22} {:<14}",
            truncate(&ad_set.id, 18),
            truncate(ad_set.name.as_deref().unwrap_or("-"), 32),
            ad_set.status.as_deref().unwrap_or("-"),
            truncate(ad_set.optimization_goal.as_deref().unwrap_or("-"), 22),
            format_cents(ad_set.daily_budget.as_deref())
        );
    }
}

fn account_status_label(status: Option<i64>) -> &'static str {
    match status {
        Some(1) => "Active",
        Some(_) => "Inactive",
        None => "-",
    }
}

/// Monetary fields arrive as cent-denominated strings.
fn format_cents(value: Option<&str>) -> String {
    match value.and_then(|v| v.parse::<i64>().ok()) {
        Some(cents) => format!("${:.2}", cents as f64 / 100.0),
        None => "-".to_owned(),
    }
}

fn parse_metric(value: Option<&str>) -> f64 {
    value.and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0)
}

fn truncate(value: &str, max_len: usize) -> String {
    let mut chars = value.chars();
    let mut collected = String::new();
    for _ in 0..max_len.saturating_sub(1) {
        match chars.next() {
            Some(ch) => collected.push(ch),
            None => return value.to_owned(),
        }
    }
    if chars.next().is_some() {
        collected.push('…');
        collected
    } else {
        value.to_owned()
    }
}
