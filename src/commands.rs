//! Komendy slash: /b (saldo portfela), /c (kalkulator nagród z kopania) i /commands (pomoc).

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use serenity::all::*;

use crate::AppContext;
use crate::provider::{DataProvider, MetricSource, MetricValue};

/// 1 KLS = 1e8 najmniejszych jednostek.
const SOMPI_PER_KLS: f64 = 1e8;
const BLOCKS_PER_DAY: f64 = 86_400.0;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^karlsen(test|dev|sim)?:[a-z0-9]{61,63}$").expect("static regex"));

pub struct Commands;

impl Commands {
    pub async fn register_commands(ctx: &Context, gid: GuildId) -> Result<()> {
        gid.create_command(
            &ctx.http,
            CreateCommand::new("b")
                .description("Check the balance of a Karlsen wallet")
                .add_option(
                    CreateCommandOption::new(CommandOptionType::String, "address", "karlsen:… address")
                        .required(true),
                ),
        )
        .await?;

        gid.create_command(
            &ctx.http,
            CreateCommand::new("c")
                .description("Estimate mining rewards for a hashrate")
                .add_option(
                    CreateCommandOption::new(CommandOptionType::Number, "hashrate", "Your hashrate in MH/s")
                        .required(true)
                        .min_number_value(0.0),
                ),
        )
        .await?;

        gid.create_command(
            &ctx.http,
            CreateCommand::new("commands").description("List the bot commands"),
        )
        .await?;
        Ok(())
    }

    pub async fn on_interaction(ctx: &Context, app: &AppContext, interaction: Interaction) {
        let Some(cmd) = interaction.command() else {
            return;
        };
        let res = match cmd.data.name.as_str() {
            "b" => handle_balance(ctx, app, &cmd).await,
            "c" => handle_rewards(ctx, app, &cmd).await,
            "commands" => handle_help(ctx, app, &cmd).await,
            _ => return,
        };
        if let Err(e) = res {
            tracing::warn!(error = ?e, command = %cmd.data.name, "commands: handler failed");
            let _ = cmd
                .edit_response(&ctx.http, EditInteractionResponse::new().content("❌ Something went wrong."))
                .await;
        }
    }
}

/* ==============================
   /b
   ============================== */

async fn handle_balance(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    let allowed = app.settings.commands.balance_channel_id;
    if !channel_allowed(cmd.channel_id.get(), allowed) {
        return reply_ephemeral(ctx, cmd, &wrong_channel(allowed)).await;
    }

    let address = cmd
        .data
        .options
        .iter()
        .find_map(|o| match (o.name.as_str(), &o.value) {
            ("address", CommandDataOptionValue::String(s)) => Some(s.trim().to_string()),
            _ => None,
        })
        .unwrap_or_default();

    if !is_valid_address(&address) {
        return reply_ephemeral(ctx, cmd, "Usage: /b <karlsen:address>").await;
    }

    cmd.create_response(&ctx.http, CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()))
        .await?;

    tracing::info!(%address, user_id = cmd.user.id.get(), "commands: /b");
    let text = match app.provider().wallet_balance(&address).await {
        Ok(sompi) => balance_message(&address, sompi),
        Err(e) => {
            tracing::warn!(error = %e, %address, "commands: balance lookup failed");
            format!("Could not retrieve the balance for `{address}`. Try again later.")
        }
    };

    cmd.edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await?;
    Ok(())
}

pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_RE.is_match(address)
}

pub fn balance_message(address: &str, sompi: f64) -> String {
    format!(
        "The wallet `{address}` has a balance of {:.8} KLS",
        sompi / SOMPI_PER_KLS
    )
}

/* ==============================
   /c
   ============================== */

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rewards {
    pub day: f64,
    pub week: f64,
    pub month: f64,
}

/// `user_mhs` w MH/s, `network_ths` w TH/s.
pub fn calculate_rewards(block_reward: f64, network_ths: f64, user_mhs: f64) -> Option<Rewards> {
    if network_ths <= 0.0 || !network_ths.is_finite() || user_mhs < 0.0 {
        return None;
    }
    let share = (user_mhs / 1e6) / network_ths;
    let day = block_reward * BLOCKS_PER_DAY * share;
    Some(Rewards {
        day,
        week: day * 7.0,
        month: day * (365.25 / 12.0),
    })
}

pub fn rewards_message(block_reward: f64, network_ths: f64, price: f64, r: &Rewards) -> String {
    let mut msg = format!(
        "**🌐 Network Hashrate:** {network_ths:.3} TH/s\n\n\
         **⛏️ Block Reward:** {block_reward:.2} KLS\n\n\
         **💰 Price:** {price:.4} USD\n\n\
         **📊 Estimated Rewards:**\n"
    );
    for (period, kls) in [("Day", r.day), ("Week", r.week), ("Month", r.month)] {
        msg.push_str(&format!("- {period}: {kls:.2} KLS ({:.3} USD)\n", kls * price));
    }
    msg
}

async fn handle_rewards(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    let allowed = app.settings.commands.calc_channel_id;
    if !channel_allowed(cmd.channel_id.get(), allowed) {
        return reply_ephemeral(ctx, cmd, &wrong_channel(allowed)).await;
    }

    let Some(user_mhs) = cmd.data.options.iter().find_map(|o| match (o.name.as_str(), &o.value) {
        ("hashrate", CommandDataOptionValue::Number(n)) => Some(*n),
        ("hashrate", CommandDataOptionValue::Integer(n)) => Some(*n as f64),
        _ => None,
    }) else {
        return reply_ephemeral(ctx, cmd, "Usage: /c <hashrate_in_MH/s>").await;
    };

    cmd.create_response(&ctx.http, CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()))
        .await?;

    let provider = app.provider();
    let text = match network_snapshot(provider.as_ref()).await {
        Ok((block_reward, network_ths, price)) => {
            match calculate_rewards(block_reward, network_ths, user_mhs) {
                Some(r) => rewards_message(block_reward, network_ths, price, &r),
                None => "Error retrieving network data or KLS price. Try again later.".to_string(),
            }
        }
        Err(e) => {
            tracing::warn!(error = ?e, "commands: /c data fetch failed");
            "Error retrieving network data or KLS price. Try again later.".to_string()
        }
    };

    cmd.edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await?;
    Ok(())
}

async fn network_snapshot(provider: &dyn DataProvider) -> Result<(f64, f64, f64)> {
    let block_reward = number(provider.fetch(MetricSource::BlockReward).await?)?;
    let network_ths = number(provider.fetch(MetricSource::Hashrate).await?)?;
    let price = number(provider.fetch(MetricSource::Price).await?)?;
    Ok((block_reward, network_ths, price))
}

fn number(v: MetricValue) -> Result<f64> {
    match v {
        MetricValue::Number(n) => Ok(n),
        other => Err(anyhow!("expected a number, got {other:?}")),
    }
}

/* ==============================
   /commands
   ============================== */

// ten sam kanał co /b
async fn handle_help(ctx: &Context, app: &AppContext, cmd: &CommandInteraction) -> Result<()> {
    let allowed = app.settings.commands.balance_channel_id;
    if !channel_allowed(cmd.channel_id.get(), allowed) {
        return reply_ephemeral(ctx, cmd, &wrong_channel(allowed)).await;
    }
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(help_text())),
    )
    .await?;
    Ok(())
}

pub fn help_text() -> String {
    "**Available Commands:**\n\n\
     1. **/b <wallet_address>**\n\
     \u{20}  - Usage: `/b karlsen:qzrq7v5jhsc5znvtfdg6vxg7dz5x8dqe4wrh90jkdnwehp6vr8uj7csdss2l7`\n\
     \u{20}  - Retrieves and displays the balance for the specified wallet address.\n\n\
     2. **/c <hashrate_in_MH/s>**\n\
     \u{20}  - Usage: `/c 250`\n\
     \u{20}  - Estimates daily, weekly and monthly mining rewards for that hashrate.\n"
        .to_string()
}

/* ==============================
   Pomocnicze
   ============================== */

/// 0 = bez ograniczenia kanału.
fn channel_allowed(channel_id: u64, allowed: u64) -> bool {
    allowed == 0 || channel_id == allowed
}

fn wrong_channel(allowed: u64) -> String {
    format!("This command can only be used in the <#{allowed}> channel.")
}

async fn reply_ephemeral(ctx: &Context, cmd: &CommandInteraction, text: &str) -> Result<()> {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(text)
                .ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewards_scale_with_share_of_network() {
        // 1 TH/s z 100 TH/s, 10 KLS na blok
        let r = calculate_rewards(10.0, 100.0, 1_000_000.0).unwrap();
        assert!((r.day - 8_640.0).abs() < 1e-6);
        assert!((r.week - 60_480.0).abs() < 1e-6);
        assert!((r.month - 8_640.0 * 30.4375).abs() < 1e-6);
        assert!(calculate_rewards(10.0, 0.0, 1.0).is_none());
    }

    #[test]
    fn balance_uses_eight_decimals() {
        assert_eq!(
            balance_message("karlsen:x", 123_456_789.0),
            "The wallet `karlsen:x` has a balance of 1.23456789 KLS"
        );
    }

    #[test]
    fn help_lists_both_commands_with_a_valid_example() {
        let h = help_text();
        assert!(h.contains("/b <wallet_address>") && h.contains("/c <hashrate_in_MH/s>"));
        let example = h
            .split('`')
            .find(|s| s.starts_with("/b "))
            .and_then(|s| s.strip_prefix("/b "))
            .unwrap();
        assert!(is_valid_address(example));
    }

    #[test]
    fn address_shape() {
        let ok = format!("karlsen:{}", "q".repeat(61));
        assert!(is_valid_address(&ok));
        assert!(!is_valid_address("karlsen:short"));
        assert!(!is_valid_address(&format!("kaspa:{}", "q".repeat(61))));
        assert!(channel_allowed(5, 0) && channel_allowed(5, 5) && !channel_allowed(5, 6));
    }
}
