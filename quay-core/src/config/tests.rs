#[cfg(test)]
mod tests {
    use crate::config::loader::parse_config;
    use crate::config::model::*;

    fn create_test_config() -> Config {
        Config {
            load_balancer: LoadBalancerSettings {
                default_strategy: BalancingStrategy::RoundRobin,
                max_concurrent_workers_per_provider: 4,
                teardown_grace_period_millis: 1000,
            },
            registry: RegistrySettings {
                max_allowed_registered_providers: 3,
                health_check_frequency_millis: 100,
                health_check_request_timeout_millis: 50,
            },
        }
    }

    #[test]
    fn test_config_validation_success() {
        let config = create_test_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.load_balancer.default_strategy, BalancingStrategy::Random);
        assert_eq!(config.load_balancer.max_concurrent_workers_per_provider, 10);
        assert_eq!(config.registry.max_allowed_registered_providers, 10);
    }

    #[test]
    fn test_config_validation_zero_workers() {
        let mut config = create_test_config();
        config.load_balancer.max_concurrent_workers_per_provider = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_concurrent_workers_per_provider"));
    }

    #[test]
    fn test_config_validation_zero_max_providers() {
        let mut config = create_test_config();
        config.registry.max_allowed_registered_providers = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_allowed_registered_providers"));
    }

    #[test]
    fn test_config_validation_zero_health_check_timeout() {
        let mut config = create_test_config();
        config.registry.health_check_request_timeout_millis = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot be 0"));
    }

    #[test]
    fn test_parse_config_with_defaults() {
        let config = parse_config(
            r#"
[load_balancer]
default_strategy = "round_robin"

[registry]
max_allowed_registered_providers = 2
"#,
        )
        .unwrap();

        assert_eq!(config.load_balancer.default_strategy, BalancingStrategy::RoundRobin);
        assert_eq!(config.load_balancer.max_concurrent_workers_per_provider, 10);
        assert_eq!(config.registry.max_allowed_registered_providers, 2);
        assert_eq!(config.registry.health_check_frequency_millis, 1000);
    }

    #[test]
    fn test_parse_config_rejects_unknown_strategy() {
        let result = parse_config(
            r#"
[load_balancer]
default_strategy = "least_latency"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_config_rejects_invalid_values() {
        let result = parse_config(
            r#"
[registry]
health_check_frequency_millis = 0
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_example_toml_round_trips() {
        let config = parse_config(&Config::example_toml()).unwrap();
        assert_eq!(config.registry.health_check_request_timeout_millis, 500);
        assert_eq!(config.load_balancer.teardown_grace_period_millis, 5000);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("random".parse::<BalancingStrategy>().unwrap(), BalancingStrategy::Random);
        assert_eq!(
            "ROUND-ROBIN".parse::<BalancingStrategy>().unwrap(),
            BalancingStrategy::RoundRobin
        );
        assert!("weighted".parse::<BalancingStrategy>().is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let config = create_test_config();
        assert_eq!(config.registry.health_check_interval().as_millis(), 100);
        assert_eq!(config.registry.health_check_timeout().as_millis(), 50);
        assert_eq!(config.load_balancer.teardown_grace_period().as_millis(), 1000);
    }
}
