//! Command line quotes over a pool snapshot file.

pub mod arguments;

use {
    anyhow::{Context, Result},
    arguments::Arguments,
    sor::{Snapshot, SwapInfo},
    std::fs,
};

/// Reads the snapshot and computes the quote described by `args`.
pub fn run(args: &Arguments, now: u64) -> Result<SwapInfo> {
    let contents = fs::read_to_string(&args.snapshot)
        .with_context(|| format!("reading {}", args.snapshot.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&contents).context("parsing pool snapshot")?;
    tracing::debug!(pools = snapshot.pools.len(), "loaded snapshot");

    let config = args.config(now);
    let request = args.request();
    let info = if args.legacy_direct {
        sor::get_best_swaps_direct(&snapshot.pools, &request, &config)
    } else {
        sor::get_best_swaps(&snapshot.pools, &request, &config)
    }
    .context("computing quote")?;
    if info.is_empty() {
        tracing::warn!("insufficient liquidity for the requested amount");
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use {super::*, clap::Parser, std::io::Write};

    const SNAPSHOT: &str = r#"{
        "pools": [
            {
                "poolType": "Weighted",
                "id": "0x0000000000000000000000000000000000000000000000000000000000000001",
                "address": "0x0000000000000000000000000000000000000100",
                "swapFee": "0.003",
                "totalShares": "100",
                "tokens": [
                    {
                        "address": "0x0000000000000000000000000000000000000001",
                        "balance": "100",
                        "decimals": 18,
                        "weight": "0.5"
                    },
                    {
                        "address": "0x0000000000000000000000000000000000000002",
                        "balance": "100",
                        "decimals": 18,
                        "weight": "0.5"
                    }
                ]
            }
        ]
    }"#;

    fn args(file: &tempfile::NamedTempFile, amount: &str, extra: &[&str]) -> Arguments {
        let path = file.path().to_str().unwrap();
        let mut args = vec![
            "sor-quote",
            path,
            "--token-in",
            "0x0000000000000000000000000000000000000001",
            "--token-out",
            "0x0000000000000000000000000000000000000002",
            "--amount",
            amount,
        ];
        args.extend(extra);
        Arguments::try_parse_from(args).unwrap()
    }

    #[test]
    fn quotes_from_a_snapshot_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();

        for extra in [&[][..], &["--legacy-direct"][..]] {
            let info = run(&args(&file, "10", extra), 0).unwrap();
            assert_eq!(info.swaps.len(), 1);
            let out = info.return_amount.as_u128() as f64 / 1e18;
            assert!((out - 9.066108938801491).abs() < 1e-6, "{out}");
        }

        let info = run(&args(&file, "50", &["--kind", "exact-out"]), 0).unwrap();
        assert!(info.is_empty());

        let info = run(&args(&file, "0", &[]), 0).unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn builds_config_from_arguments() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let args = args(
            &file,
            "10",
            &["--allow-add-remove", "true", "--timestamp", "42"],
        );
        let config = args.config(7);
        assert!(config.allow_add_remove);
        assert_eq!(config.current_timestamp, 42);
        assert_eq!(config.max_equalization_iterations, 100);
        assert!(run(&args, 7).is_err());
    }
}
