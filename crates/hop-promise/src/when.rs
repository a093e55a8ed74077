use crate::promise::Promise;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

struct Slots<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

/// Joins existing promises.
///
/// Resolves with every value, in the order the promises were given, once all
/// of them resolve. Rejects as soon as any one of them rejects; the others
/// are left to settle on their own. An empty input resolves with `vec![]`.
/// If an input is abandoned, so is the join.
pub fn all<I, T, E>(promises: I) -> Promise<Vec<T>, E>
where
    I: IntoIterator<Item = Promise<T, E>>,
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let promises: Vec<_> = promises.into_iter().collect();
    let joined = Promise::new();

    if promises.is_empty() {
        joined.resolve(Vec::new());
        return joined;
    }

    let slots = Arc::new(Mutex::new(Slots {
        values: (0..promises.len()).map(|_| None).collect(),
        remaining: promises.len(),
    }));

    for (index, promise) in promises.iter().enumerate() {
        let on_value = {
            let joined = joined.clone();
            let slots = Arc::clone(&slots);
            move |value: T| {
                let values = {
                    let mut slots = slots.lock();
                    slots.values[index] = Some(value);
                    slots.remaining -= 1;
                    if slots.remaining > 0 {
                        return;
                    }
                    std::mem::take(&mut slots.values)
                };
                joined.resolve(values.into_iter().flatten().collect());
            }
        };
        let on_error = {
            let joined = joined.clone();
            move |error: E| {
                joined.reject(error);
            }
        };
        let on_abandon = {
            let joined = joined.clone();
            move |reason: String| {
                joined.abandon(reason);
            }
        };
        promise.then_or_abandon(on_value, on_error, on_abandon);
    }

    joined
}

/// Runs every future as its own task and joins the results like [`all`].
///
/// Tasks start immediately and are never cancelled, so a rejection does not
/// stop the remaining inputs. A panicking task abandons the join, and
/// awaiting it then panics instead of waiting forever.
///
/// # Panics
///
/// Panics if called outside of a tokio runtime.
pub fn when<I, F, T, E>(futures: I) -> Promise<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    all(futures.into_iter().map(Promise::spawn))
}

/// Joins a fixed list of futures that share one `Result` type.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let values = hop_promise::when![
///     async { Ok::<_, String>(1) },
///     async { Ok(2) },
/// ]
/// .await;
/// assert_eq!(values, Ok(vec![1, 2]));
/// # }
/// ```
#[macro_export]
macro_rules! when {
    ($($future:expr),* $(,)?) => {
        $crate::when(::std::vec![$($crate::__private::FutureExt::boxed($future)),*])
    };
}
