//! Topic routing.
//!
//! The topic table is a derived mapping from MQTT topic to every
//! (entity, channel) pair subscribed to it. It is rebuilt as a whole on
//! every entity mutation and swapped in atomically by the store, so message
//! routing only ever sees a complete table.

use crate::model::{Channel, EntityRef, QosLevel, Reservoir, Sensor};
use std::collections::HashMap;

/// Derived topic → targets mapping plus the desired subscription set.
#[derive(Debug, Clone, Default)]
pub struct TopicTable {
    routes: HashMap<String, Vec<(EntityRef, Channel)>>,
    /// Highest QoS requested per topic, across all entities sharing it.
    qos: HashMap<String, QosLevel>,
}

impl TopicTable {
    /// Build the table from the current entity set.
    pub fn rebuild<'a>(
        sensors: impl Iterator<Item = &'a Sensor>,
        reservoirs: impl Iterator<Item = &'a Reservoir>,
    ) -> Self {
        let mut table = Self::default();

        for sensor in sensors {
            table.add(
                &sensor.input.topic,
                sensor.input.qos,
                EntityRef::Sensor(sensor.id.clone()),
                Channel::Sensor,
            );
        }

        for reservoir in reservoirs {
            let entity = EntityRef::Reservoir(reservoir.id.clone());
            table.add(
                &reservoir.level.topic,
                reservoir.level.qos,
                entity.clone(),
                Channel::Level,
            );
            for (config, channel) in [
                (&reservoir.pump, Channel::Pump),
                (&reservoir.fill, Channel::Fill),
                (&reservoir.mode, Channel::Mode),
            ] {
                if let Some(config) = config {
                    table.add(&config.topic, config.qos, entity.clone(), channel);
                }
            }
        }

        table
    }

    fn add(&mut self, topic: &str, qos: QosLevel, entity: EntityRef, channel: Channel) {
        self.routes
            .entry(topic.to_string())
            .or_default()
            .push((entity, channel));
        self.qos
            .entry(topic.to_string())
            .and_modify(|q| {
                if qos.value() > q.value() {
                    *q = qos;
                }
            })
            .or_insert(qos);
    }

    /// Every (entity, channel) pair listening on a topic. Empty when none.
    pub fn resolve(&self, topic: &str) -> &[(EntityRef, Channel)] {
        self.routes.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The (topic, QoS) set the transport should be subscribed to.
    pub fn desired_subscriptions(&self) -> Vec<(String, QosLevel)> {
        self.qos
            .iter()
            .map(|(topic, qos)| (topic.clone(), *qos))
            .collect()
    }

    pub fn topic_count(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Sensor, TopicConfig};

    fn sensor(id: &str, topic: &str) -> Sensor {
        Sensor::new(id, id, TopicConfig::raw(topic))
    }

    #[test]
    fn test_resolve_multiple_targets() {
        let sensors = [
            sensor("a", "farm/shared"),
            sensor("b", "farm/shared"),
            sensor("c", "farm/other"),
        ];

        let table = TopicTable::rebuild(sensors.iter(), std::iter::empty());

        let targets = table.resolve("farm/shared");
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&(EntityRef::Sensor("a".to_string()), Channel::Sensor)));
        assert!(targets.contains(&(EntityRef::Sensor("b".to_string()), Channel::Sensor)));

        assert_eq!(table.resolve("farm/other").len(), 1);
        assert!(table.resolve("farm/unknown").is_empty());
    }

    #[test]
    fn test_reservoir_channels_routed() {
        let mut reservoir = Reservoir::new("r1", "Tank", TopicConfig::raw("tank/level"));
        reservoir.pump = Some(TopicConfig::raw("tank/pump"));
        reservoir.mode = Some(TopicConfig::raw("tank/mode"));

        let table = TopicTable::rebuild(std::iter::empty(), std::iter::once(&reservoir));

        assert_eq!(
            table.resolve("tank/level"),
            &[(EntityRef::Reservoir("r1".to_string()), Channel::Level)]
        );
        assert_eq!(
            table.resolve("tank/pump"),
            &[(EntityRef::Reservoir("r1".to_string()), Channel::Pump)]
        );
        assert!(table.resolve("tank/fill").is_empty());
        assert_eq!(table.topic_count(), 3);
    }

    #[test]
    fn test_shared_topic_takes_highest_qos() {
        let mut s1 = sensor("a", "farm/shared");
        s1.input.qos = QosLevel::AT_MOST_ONCE;
        let mut s2 = sensor("b", "farm/shared");
        s2.input.qos = QosLevel::EXACTLY_ONCE;

        let sensors = [s1, s2];
        let table = TopicTable::rebuild(sensors.iter(), std::iter::empty());

        let subs = table.desired_subscriptions();
        assert_eq!(subs, vec![("farm/shared".to_string(), QosLevel::EXACTLY_ONCE)]);
    }
}
