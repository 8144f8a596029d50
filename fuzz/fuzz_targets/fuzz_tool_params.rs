#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(args) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Ok(runtime) = tokio_runtime() else {
        return;
    };
    runtime.block_on(async {
        for tool in agentrelay::tools::builtin_tools() {
            let _ = tool.execute(args.clone()).await;
        }
    });
});

fn tokio_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().build()
}
