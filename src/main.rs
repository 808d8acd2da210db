// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

#[cfg(windows)]
fn main() {
    use debloat_tool::{
        constants::{APP_NAME, STATE_FILE},
        reconciler::{Reconciler, RunMode},
        report::build_summary,
        state::StateStore,
        targets::{managed_registry_values, managed_services},
        utils::{
            registry::WindowsRegistry,
            services::WindowsServices,
            windows::{is_elevated, prompt_mode, show_error, show_info, PromptChoice},
        },
    };
    use tracing::Level;

    // Initialize logging based on build mode
    #[cfg(debug_assertions)]
    {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        // In release mode, set up a no-op subscriber to disable logging
        use tracing_subscriber::Registry;
        let noop_subscriber = Registry::default();
        let _ = tracing::subscriber::set_global_default(noop_subscriber);
    }

    // Elevation is checked once, before any item is touched.
    if !is_elevated() {
        show_error(
            "This tool must be run as Administrator.\n\n\
             Right-click the EXE and choose:\n\
             'Run as administrator'",
            "Administrator Required",
        );
        std::process::exit(1);
    }

    let mode = match prompt_mode(APP_NAME) {
        PromptChoice::Apply => RunMode::Apply,
        PromptChoice::Restore => RunMode::Restore,
        PromptChoice::Audit => RunMode::Audit,
        PromptChoice::Exit => return,
    };
    tracing::debug!("Selected mode: {:?}", mode);

    let mut store = StateStore::load(&*STATE_FILE);
    let services = WindowsServices;
    let registry = WindowsRegistry;

    let report = Reconciler::new(&services, &registry).run(
        mode,
        &managed_services(),
        &managed_registry_values(),
        &mut store,
    );

    show_info(&build_summary(mode, &report), "Operation Complete");
}

#[cfg(not(windows))]
fn main() {
    eprintln!("debloat_tool manages Windows services and registry values and only runs on Windows.");
    std::process::exit(1);
}
