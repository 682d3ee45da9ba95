use rand::Rng;
use std::fmt;
use std::time::Duration;

/// 发送请求前的思考时间，在 [min, max] 上均匀分布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThinkTime {
    min: Duration,
    max: Duration,
}

impl ThinkTime {
    /// 不等待
    pub fn none() -> Self {
        Self::default()
    }

    pub fn constant(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// 上下界顺序颠倒时自动交换
    pub fn uniform(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn is_none(&self) -> bool {
        self.max.is_zero()
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// 抽取一次延迟
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let nanos = rand::rng().random_range(self.min.as_nanos()..=self.max.as_nanos());
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for ThinkTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", humantime::format_duration(self.min))
        } else {
            write!(
                f,
                "uniform({}, {})",
                humantime::format_duration(self.min),
                humantime::format_duration(self.max)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_millisecond_range() {
        let think = ThinkTime::uniform(Duration::from_micros(100), Duration::from_micros(900));
        let samples: Vec<Duration> = (0..50).map(|_| think.sample()).collect();
        assert!(samples.iter().all(|d| *d >= think.min() && *d <= think.max()));
        assert!(samples.iter().any(|d| *d != think.min()));
    }

    #[test]
    fn test_none_is_zero() {
        let think = ThinkTime::none();
        assert!(think.is_none());
        assert_eq!(think.sample(), Duration::ZERO);
    }

    #[test]
    fn test_constant() {
        let think = ThinkTime::constant(Duration::from_millis(250));
        assert!(!think.is_none());
        assert_eq!(think.sample(), Duration::from_millis(250));
    }

    #[test]
    fn test_uniform_within_bounds() {
        let think = ThinkTime::uniform(Duration::from_millis(100), Duration::from_millis(200));
        for _ in 0..100 {
            let delay = think.sample();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_uniform_swaps_bounds() {
        let think = ThinkTime::uniform(Duration::from_secs(3), Duration::from_secs(1));
        assert_eq!(think.min(), Duration::from_secs(1));
        assert_eq!(think.max(), Duration::from_secs(3));
    }

    #[test]
    fn test_display() {
        assert_eq!(ThinkTime::constant(Duration::from_secs(2)).to_string(), "2s");
        assert_eq!(
            ThinkTime::uniform(Duration::from_secs(1), Duration::from_secs(3)).to_string(),
            "uniform(1s, 3s)"
        );
    }
}
