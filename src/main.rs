use pipeshell::Interpreter;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    Interpreter::default().repl()?;
    Ok(())
}
