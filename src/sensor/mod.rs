pub mod valve;

use rand::Rng;

use crate::Settings;

/// A single measurement source.
pub trait Sensor: Send {
    fn unit(&self) -> &str;
    fn read(&mut self) -> f64;
}

/// Bounded random walk standing in for a hardware sensor. Each read steps by
/// up to a tenth of the distance to the farthest bound, clamped to
/// `[min, max]`.
pub struct RandomizedSensor {
    unit: String,
    min: f64,
    max: f64,
    value: f64,
}

impl RandomizedSensor {
    pub fn new(unit: &str, min: f64, max: f64) -> Self {
        RandomizedSensor {
            unit: unit.to_string(),
            min,
            max,
            value: min + (max - min) / 2.0,
        }
    }
}

impl Sensor for RandomizedSensor {
    fn unit(&self) -> &str {
        &self.unit
    }

    fn read(&mut self) -> f64 {
        let step = (self.max - self.value).max(self.value - self.min) / 10.0;
        self.value += rand::thread_rng().gen_range(-step..=step);
        self.value = self.value.clamp(self.min, self.max);
        self.value
    }
}

/// The default deployment: five flow sensors and six pressure sensors, all
/// randomized. Ordering is stable so chart and preference indices stay put.
pub fn default_sensors() -> Vec<(String, Box<dyn Sensor>)> {
    let mut sensors: Vec<(String, Box<dyn Sensor>)> = Vec::new();
    for i in 0..5 {
        sensors.push((
            format!("flow{}", i),
            Box::new(RandomizedSensor::new(
                Settings::FLOW_UNIT,
                Settings::SENSOR_MIN,
                Settings::SENSOR_MAX,
            )),
        ));
    }
    for i in 0..6 {
        sensors.push((
            format!("pressure{}", i),
            Box::new(RandomizedSensor::new(
                Settings::PRESSURE_UNIT,
                Settings::SENSOR_MIN,
                Settings::SENSOR_MAX,
            )),
        ));
    }
    sensors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_randomized_sensor_stays_in_bounds() {
        let mut sensor = RandomizedSensor::new("bar", 0.0, 5.0);
        for _ in 0..1000 {
            let v = sensor.read();
            assert!((0.0..=5.0).contains(&v));
        }
    }

    #[test]
    fn test_default_sensor_names() {
        let sensors = default_sensors();
        assert_eq!(sensors.len(), 11);
        assert_eq!(sensors[0].0, "flow0");
        assert_eq!(sensors[5].0, "pressure0");
        assert_eq!(sensors[0].1.unit(), "L/min");
        assert_eq!(sensors[5].1.unit(), "bar");
    }
}
