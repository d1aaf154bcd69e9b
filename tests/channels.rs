use std::sync::{Arc, Mutex};

use vetka::{
    listener, BrokerOptions, CallResult, CallStrategy, ConnectionOptions, EventBroker, WatchError,
};

fn broker(name: &str) -> Arc<EventBroker<String>> {
    EventBroker::new(BrokerOptions::new(name))
}

/// Тест проверяет кеширование каналов по идентичности: одно имя —
/// один экземпляр, разные имена — разные.
#[test]
fn test_channel_instances_are_cached() {
    let broker = broker("node");
    let first = broker.channel("user:login");
    let second = broker.channel("user:login");
    let other = broker.channel("other:event");

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    broker.shutdown();
}

/// Тест проверяет, что канал дописывает префикс: слушатель, повешенный
/// через канал, получает эмиссию полного имени через брокер, и наоборот.
#[test]
fn test_channel_prefixes_event_names() {
    let broker = broker("node");
    let channel = broker.channel("user");
    let received = Arc::new(Mutex::new(Vec::new()));

    let sink = received.clone();
    channel
        .on(
            "login",
            listener(move |p: &String| {
                sink.lock().unwrap().push(p.clone());
                Ok(None)
            }),
        )
        .unwrap();

    // полное имя у брокера и короткое имя у канала — это одно событие
    broker.emit("user:login", "via-broker".to_string()).unwrap();
    channel.emit("login", "via-channel".to_string()).unwrap();

    assert_eq!(
        *received.lock().unwrap(),
        vec!["via-broker".to_string(), "via-channel".to_string()]
    );
    broker.shutdown();
}

/// Тест проверяет снятие слушателя через другой хэндл того же канала:
/// кеш по идентичности делает `off` симметричным `on`.
#[test]
fn test_off_via_other_channel_handle() {
    let broker = broker("node");
    let calls = Arc::new(Mutex::new(0usize));

    let counter = calls.clone();
    let l = listener(move |_: &String| {
        *counter.lock().unwrap() += 1;
        Ok(None)
    });
    broker.channel("jobs").on("done", l.clone()).unwrap();
    broker.channel("jobs").off("done", Some(&l)).unwrap();

    broker.emit("jobs:done", "x".to_string()).unwrap();
    assert_eq!(*calls.lock().unwrap(), 0);
    broker.shutdown();
}

/// Тест проверяет вложенные каналы: префиксы сцепляются транзитивно,
/// вложенный экземпляр кешируется на уровне брокера.
#[test]
fn test_nested_channels_compose_prefixes() {
    let broker = broker("node");
    let api = broker.channel("api");
    let v1 = api.channel("v1").unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let sink = received.clone();
    v1.on(
        "request",
        listener(move |p: &String| {
            sink.lock().unwrap().push(p.clone());
            Ok(None)
        }),
    )
    .unwrap();

    broker.emit("api:v1:request", "GET /".to_string()).unwrap();
    assert_eq!(*received.lock().unwrap(), vec!["GET /".to_string()]);

    assert!(Arc::ptr_eq(&v1, &broker.channel("api:v1")));
    broker.shutdown();
}

/// Тест проверяет `call` через канал и разделитель из опций брокера.
#[test]
fn test_channel_call_with_custom_delimiter() {
    let broker: Arc<EventBroker<String>> =
        EventBroker::new(BrokerOptions::new("node").with_delimiter("."));
    let channel = broker.channel("math");
    channel
        .on("double", listener(|p: &String| Ok(Some(format!("{p}{p}")))))
        .unwrap();

    let result = broker
        .call("math.double", "ab".to_string(), CallStrategy::First)
        .unwrap();
    assert_eq!(result, CallResult::Value(Some("abab".to_string())));

    let via_channel = channel
        .call("double", "cd".to_string(), CallStrategy::First)
        .unwrap();
    assert_eq!(via_channel, CallResult::Value(Some("cdcd".to_string())));
    broker.shutdown();
}

/// Тест проверяет `broadcast` через канал: пир получает событие с
/// полным именем канала.
#[test]
fn test_channel_broadcast_propagates_to_peers() {
    let a = broker("A");
    let b = broker("B");
    a.connect_to(&b, ConnectionOptions::default()).unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    b.on(
        "news:update",
        listener(move |p: &String| {
            sink.lock().unwrap().push(p.clone());
            Ok(None)
        }),
    )
    .unwrap();

    a.channel("news")
        .broadcast("update", "flash".to_string())
        .unwrap();
    assert_eq!(*received.lock().unwrap(), vec!["flash".to_string()]);

    a.shutdown();
    b.shutdown();
}

/// Тест проверяет `watch` через канал: эмиссия полного имени разрешает
/// ожидание короткого.
#[tokio::test]
async fn test_channel_watch_scoped_name() {
    let broker: Arc<EventBroker<String>> = EventBroker::new(BrokerOptions::new("node"));
    let channel = broker.channel("user");

    let pending = channel.watch("login", None);
    let fire = async {
        broker.emit("user:login", "BF".to_string()).unwrap();
    };
    let (result, _) = tokio::join!(pending, fire);
    assert_eq!(result, Ok("BF".to_string()));
    broker.shutdown();
}

/// Тест проверяет, что канал освобождённого брокера отвечает ошибкой
/// `Shutdown` на `watch`.
#[tokio::test]
async fn test_channel_of_dropped_broker() {
    let broker = broker("node");
    let channel = broker.channel("ghosts");
    broker.shutdown();
    drop(broker);

    let err = channel.watch("e", None).await.unwrap_err();
    assert_eq!(err, WatchError::Shutdown);
}
