//! Bounded single-producer/single-consumer queues between clock domains.
//!
//! The two halves are `Send` and share nothing but the channel, so each may live in its own
//! domain (or thread). The consumer presents the oldest entry without a request cycle
//! (first-word fall-through) through a one-entry output register, like an async FIFO with a
//! registered read port.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use log::trace;

pub struct CdcProducer<T> {
    name: &'static str,
    tx: Sender<T>,
}

pub struct CdcConsumer<T> {
    name: &'static str,
    rx: Receiver<T>,
    head: Option<T>,
}

pub fn cdc_queue<T>(name: &'static str, depth: usize) -> (CdcProducer<T>, CdcConsumer<T>) {
    assert!(depth > 0, "cdc queue `{}` needs a non-zero depth", name);
    let (tx, rx) = bounded(depth);
    (CdcProducer { name, tx }, CdcConsumer { name, rx, head: None })
}

impl<T> CdcProducer<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn full(&self) -> bool {
        self.tx.is_full()
    }

    /// Pushing into a full queue is a back-pressure violation by the caller.
    pub fn push(&self, item: T) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => panic!("cdc queue `{}` overflow: producer ignored `full`", self.name),
            Err(TrySendError::Disconnected(_)) => trace!("cdc queue `{}`: consumer gone, item dropped", self.name),
        }
    }

    /// Non-panicking variant, hands the item back when the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) => Err(item),
            Err(TrySendError::Disconnected(_)) => Ok(()),
        }
    }
}

impl<T> CdcConsumer<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn empty(&self) -> bool {
        self.head.is_none() && self.rx.is_empty()
    }

    /// Entries currently visible to the consumer, including the output register.
    pub fn len(&self) -> usize {
        self.rx.len() + self.head.is_some() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.empty()
    }

    /// Oldest entry, visible as soon as the queue is non-empty.
    pub fn front(&mut self) -> Option<&T> {
        if self.head.is_none() {
            self.head = self.fetch();
        }
        self.head.as_ref()
    }

    pub fn pop(&mut self) -> Option<T> {
        self.head.take().or_else(|| self.fetch())
    }

    fn fetch(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Flit;

    #[test]
    fn full_and_empty_flags() {
        let (tx, mut rx) = cdc_queue::<u16>("t", 2);
        assert!(rx.empty());
        tx.push(1);
        assert!(!rx.empty());
        assert!(!tx.full());
        tx.push(2);
        assert!(tx.full());
        assert_eq!(Err(3), tx.try_push(3));
        assert_eq!(Some(&1), rx.front());
        assert_eq!(Some(1), rx.pop());
        assert_eq!(Some(2), rx.pop());
        assert!(rx.empty());
        assert_eq!(None, rx.pop());
    }

    #[test]
    fn front_does_not_consume() {
        let (tx, mut rx) = cdc_queue::<u16>("t", 4);
        tx.push(7);
        assert_eq!(Some(&7), rx.front());
        assert_eq!(Some(&7), rx.front());
        assert_eq!(1, rx.len());
        assert_eq!(Some(7), rx.pop());
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn overflow_is_a_caller_bug() {
        let (tx, _rx) = cdc_queue::<u16>("t", 1);
        tx.push(1);
        tx.push(2);
    }

    #[test]
    fn order_and_last_preserved_under_backpressure() {
        let (tx, mut rx) = cdc_queue::<Flit>("t", 3);
        let sent: Vec<Flit> = (0..50u16).map(|i| Flit::new(i, i % 7 == 6)).collect();
        let mut next = 0;
        let mut got = Vec::new();
        let mut tick = 0u32;
        while got.len() < sent.len() {
            // producer writes in bursts, consumer drains every third tick
            while next < sent.len() && !tx.full() && tick % 5 != 4 {
                tx.push(sent[next]);
                next += 1;
            }
            if tick % 3 == 0 {
                while let Some(f) = rx.pop() {
                    got.push(f);
                }
            }
            tick += 1;
        }
        assert_eq!(sent, got);
    }

    #[test]
    fn ordering_across_threads() {
        let (tx, mut rx) = cdc_queue::<Flit>("t", 4);
        let producer = std::thread::spawn(move || {
            for i in 0..1000u16 {
                let flit = Flit::new(i, i % 10 == 9);
                while tx.full() {
                    std::thread::yield_now();
                }
                tx.push(flit);
            }
        });
        let mut expected = 0u16;
        while expected < 1000 {
            if let Some(f) = rx.pop() {
                assert_eq!(expected, f.data);
                assert_eq!(expected % 10 == 9, f.last);
                expected += 1;
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
    }
}
