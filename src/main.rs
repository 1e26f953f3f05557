use anyhow::{Context, Result};
use cudf_binding::{init, CallArgs, Column, HostValue, Module};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Usage: `gpu-cudf [<path> <delimiter>]`
///
/// With a path, the file is split on the delimiter and every row printed.
/// Without one, a small in-memory walkthrough runs instead.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let module = init(None)?;
    info!("exports: {:?}", module.exports());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [path, delimiter] => read_file_example(&module, path, delimiter)?,
        [] => {
            split_example(&module)?;
            mask_example(&module)?;
        }
        _ => anyhow::bail!("usage: gpu-cudf [<path> <delimiter>]"),
    }

    let stats = module.memory_stats();
    info!(
        "memory on exit: {} live buffers, {} bytes reserved",
        stats.live_buffers, stats.bytes_reserved
    );
    Ok(())
}

fn read_file_example(module: &Module, path: &str, delimiter: &str) -> Result<()> {
    let args = CallArgs::new(vec![path.into(), delimiter.into()]);
    let column = module
        .read_text_file(&args)
        .with_context(|| format!("Failed to read {}", path))?;
    print_rows(&column)
}

fn split_example(module: &Module) -> Result<()> {
    info!("=== Split ===");
    let column = module.column(&CallArgs::new(vec![
        "string".into(),
        HostValue::Undefined,
        b"alpha,beta,,gamma".to_vec().into(),
    ]))?;
    let fields = column.split(",")?;
    print_rows(&fields)
}

fn mask_example(module: &Module) -> Result<()> {
    info!("=== Boolean mask ===");
    let values: Vec<u8> = [10i32, 20, 30, 40].iter().flat_map(|v| v.to_le_bytes()).collect();
    let mut column = module.column_from_bytes("int32", &values)?;
    let mask = module.column_from_bytes("bool8", &[1, 0, 0, 1])?;

    let kept = column.apply_boolean_mask(&mask)?;
    print_rows(&kept)?;

    column.set_null_count(0)?;
    column.release();
    match column.size() {
        Ok(_) => info!("size after release unexpectedly succeeded"),
        Err(e) => info!("Expected error: {} ({})", e, e.kind()),
    }
    Ok(())
}

fn print_rows(column: &Column) -> Result<()> {
    let size = column.size()?;
    info!("{} column with {} rows", column.type_name(), size);
    for i in 0..size {
        println!("{}\t{}", i, column.get_value(i)?);
    }
    Ok(())
}
