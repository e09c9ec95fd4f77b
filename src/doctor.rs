use stepwise_client::build_gate;
use stepwise_core::config::{AppConfig, DEFAULT_TASK};

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub async fn run_doctor(config: &AppConfig) {
    let mut checks = Vec::new();

    // 1. Pipeline settings
    checks.push(check_pipeline(config));

    // 2. Every readiness target, probed once
    checks.extend(check_targets(config).await);

    // 3. Model pull setting
    checks.push(check_model(config));

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_pipeline(config: &AppConfig) -> CheckResult {
    let task = if config.pipeline.task_or_default() == DEFAULT_TASK {
        "built-in task"
    } else {
        "configured task"
    };
    CheckResult {
        label: "Pipeline".into(),
        ok: config.pipeline.max_attempts > 0,
        detail: format!(
            "{}, up to {} analysis attempts, threshold {} chars",
            task, config.pipeline.max_attempts, config.pipeline.min_analysis_chars
        ),
    }
}

async fn check_targets(config: &AppConfig) -> Vec<CheckResult> {
    let gate = match build_gate(config) {
        Ok(gate) => gate,
        Err(e) => {
            return vec![CheckResult {
                label: "Readiness".into(),
                ok: false,
                detail: e.to_string(),
            }]
        }
    };

    let mut results = Vec::with_capacity(gate.targets().len());
    for probe in gate.targets() {
        let result = match probe.check().await {
            Ok(()) => CheckResult {
                label: probe.name().to_string(),
                ok: true,
                detail: "reachable".into(),
            },
            Err(e) => CheckResult {
                label: probe.name().to_string(),
                ok: false,
                detail: e.to_string(),
            },
        };
        results.push(result);
    }
    results
}

fn check_model(config: &AppConfig) -> CheckResult {
    let detail = if config.model.pull {
        format!("'{}' pulled from {} at startup", config.model.name, config.model.base_url)
    } else {
        format!("'{}' assumed present (pull disabled)", config.model.name)
    };
    CheckResult {
        label: "Model".into(),
        ok: !config.model.name.trim().is_empty(),
        detail,
    }
}
