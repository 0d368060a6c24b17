use {
    bigdecimal::BigDecimal,
    primitive_types::H160,
    sor::{Config, QuoteRequest, SwapKind},
    std::{
        fmt::{self, Display, Formatter},
        path::PathBuf,
    },
};

#[derive(clap::Parser, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
pub struct Arguments {
    /// JSON file with the pool snapshot, `{ "pools": [...] }`.
    pub snapshot: PathBuf,

    #[clap(long)]
    pub token_in: H160,

    #[clap(long)]
    pub token_out: H160,

    #[clap(long, value_enum, default_value = "exact-in")]
    pub kind: Kind,

    /// Amount of the fixed side of the trade in token units, e.g. `1.5`.
    #[clap(long)]
    pub amount: BigDecimal,

    #[clap(long, default_value = "4")]
    pub max_pools: usize,

    /// Gas cost of one hop in units of the returned token.
    #[clap(long, default_value = "0")]
    pub cost_per_hop: f64,

    /// Comma separated intermediate tokens of two hop paths. All tokens are
    /// considered when empty.
    #[clap(long, value_delimiter = ',')]
    pub hop_tokens: Vec<H160>,

    /// Relative marginal price difference at which the split is accepted.
    #[clap(long, env, default_value = "0.00001")]
    pub price_error_tolerance: f64,

    /// Smallest step of numerical derivatives.
    #[clap(long, env, default_value = "0.000001")]
    pub infinitesimal: f64,

    /// Use joins and exits of weighted and stable pools as swaps.
    #[clap(long, env, action = clap::ArgAction::Set, default_value = "false")]
    pub allow_add_remove: bool,

    #[clap(long, env, default_value = "100")]
    pub max_equalization_iterations: usize,

    /// Unix timestamp used to price pools with an expiry. Defaults to now.
    #[clap(long)]
    pub timestamp: Option<u64>,

    /// Route over weighted pools with the legacy linearized price search.
    #[clap(long)]
    pub legacy_direct: bool,

    #[clap(long, env, default_value = "warn,sor=debug,sor_quote=debug")]
    pub log_filter: String,

    #[clap(long, env)]
    pub use_json_logs: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    ExactIn,
    ExactOut,
}

impl From<Kind> for SwapKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::ExactIn => SwapKind::ExactIn,
            Kind::ExactOut => SwapKind::ExactOut,
        }
    }
}

impl Arguments {
    pub fn config(&self, now: u64) -> Config {
        Config {
            price_error_tolerance: self.price_error_tolerance,
            infinitesimal: self.infinitesimal,
            allow_add_remove: self.allow_add_remove,
            max_equalization_iterations: self.max_equalization_iterations,
            current_timestamp: self.timestamp.unwrap_or(now),
        }
    }

    pub fn request(&self) -> QuoteRequest {
        QuoteRequest {
            token_in: self.token_in,
            token_out: self.token_out,
            kind: self.kind.into(),
            amount: self.amount.clone(),
            max_pools: self.max_pools,
            cost_per_hop: self.cost_per_hop,
            hop_tokens: self.hop_tokens.clone(),
        }
    }
}

impl Display for Arguments {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let Self {
            snapshot,
            token_in,
            token_out,
            kind,
            amount,
            max_pools,
            cost_per_hop,
            hop_tokens,
            price_error_tolerance,
            infinitesimal,
            allow_add_remove,
            max_equalization_iterations,
            timestamp,
            legacy_direct,
            log_filter,
            use_json_logs,
        } = self;

        writeln!(f, "snapshot: {}", snapshot.display())?;
        writeln!(f, "token_in: {token_in:?}")?;
        writeln!(f, "token_out: {token_out:?}")?;
        writeln!(f, "kind: {kind:?}")?;
        writeln!(f, "amount: {amount}")?;
        writeln!(f, "max_pools: {max_pools}")?;
        writeln!(f, "cost_per_hop: {cost_per_hop}")?;
        writeln!(f, "hop_tokens: {hop_tokens:?}")?;
        writeln!(f, "price_error_tolerance: {price_error_tolerance}")?;
        writeln!(f, "infinitesimal: {infinitesimal}")?;
        writeln!(f, "allow_add_remove: {allow_add_remove}")?;
        writeln!(f, "max_equalization_iterations: {max_equalization_iterations}")?;
        writeln!(f, "timestamp: {timestamp:?}")?;
        writeln!(f, "legacy_direct: {legacy_direct}")?;
        writeln!(f, "log_filter: {log_filter}")?;
        writeln!(f, "use_json_logs: {use_json_logs}")?;
        Ok(())
    }
}
