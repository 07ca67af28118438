use innkeep_db::repositories::SqlPropertyRepository;
use innkeep_db::DemoSeedDataset;

use crate::commands::{
    current_thread_runtime, load_config, migrated_pool, CommandResult, StepFailure,
};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match current_thread_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let properties = SqlPropertyRepository::new(pool.clone());

        let seeded = DemoSeedDataset::load(&properties)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&properties)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        pool.close().await;
        if !verification.passed {
            return Err(("seed_verification", verification_message(&verification.issues), 6u8));
        }
        Ok::<_, StepFailure>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "demo listing seeded: {} ({} payment method(s))",
                seeded.property_ids.join(", "),
                seeded.payment_method_count
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_message(issues: &[String]) -> String {
    if issues.is_empty() {
        "seeded listing failed verification".to_string()
    } else {
        format!("seed verification failed: {}", issues.join("; "))
    }
}
