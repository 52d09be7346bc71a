fn main() -> anyhow::Result<()> {
    tasklane::cli::run_cli()
}
