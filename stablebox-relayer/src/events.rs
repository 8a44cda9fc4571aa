use base64::{engine::general_purpose, Engine as _};
use solana_sdk::pubkey::Pubkey;

use crate::constants::{EVENT_PURCHASE_AUTOMATIC, EVENT_SWAP_REQUESTED};

const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// Emitted by the escrow program when purchase proceeds need an external
/// swap before the stable reward can be paid out.
#[derive(Debug, Clone)]
pub struct SwapRequested {
    pub user: Pubkey,
    pub input_amount: u64,
    pub input_asset: String,
    pub output_asset: String,
}

/// Emitted when a purchase settles entirely on-chain at the fixed rate.
/// The relayer only logs these; no off-chain action is required.
#[derive(Debug, Clone)]
pub struct PurchaseAutomatic {
    pub user: Pubkey,
    pub amount: u64,
    pub fee: u64,
    pub swap_amount: u64,
    pub stable_received: u64,
    pub asset_type: String,
}

#[derive(Debug, Clone)]
pub enum EscrowEvent {
    SwapRequested(SwapRequested),
    PurchaseAutomatic(PurchaseAutomatic),
}

/// Parses one transaction log line. Returns `None` for anything that is not
/// a well-formed event of the escrow program.
pub fn parse_event_log(line: &str) -> Option<EscrowEvent> {
    let encoded = line.strip_prefix(PROGRAM_DATA_PREFIX)?;
    let bytes = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    if bytes.len() < 8 {
        return None;
    }
    let (discriminator, payload) = bytes.split_at(8);
    if discriminator == EVENT_SWAP_REQUESTED {
        parse_swap_requested(payload).map(EscrowEvent::SwapRequested)
    } else if discriminator == EVENT_PURCHASE_AUTOMATIC {
        parse_purchase_automatic(payload).map(EscrowEvent::PurchaseAutomatic)
    } else {
        None
    }
}

fn parse_swap_requested(payload: &[u8]) -> Option<SwapRequested> {
    let mut cursor = Cursor::new(payload);
    let event = SwapRequested {
        user: cursor.read_pubkey()?,
        input_amount: cursor.read_u64()?,
        input_asset: cursor.read_string()?,
        output_asset: cursor.read_string()?,
    };
    cursor.finished().then_some(event)
}

fn parse_purchase_automatic(payload: &[u8]) -> Option<PurchaseAutomatic> {
    let mut cursor = Cursor::new(payload);
    let event = PurchaseAutomatic {
        user: cursor.read_pubkey()?,
        amount: cursor.read_u64()?,
        fee: cursor.read_u64()?,
        swap_amount: cursor.read_u64()?,
        stable_received: cursor.read_u64()?,
        asset_type: cursor.read_string()?,
    };
    cursor.finished().then_some(event)
}

/// Little-endian cursor over a fixed event layout: pubkeys are 32 raw bytes,
/// integers are LE, strings are a u32 length prefix plus UTF-8 bytes.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        let slice = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(slice)
    }

    fn read_pubkey(&mut self) -> Option<Pubkey> {
        let bytes: [u8; 32] = self.take(32)?.try_into().ok()?;
        Some(Pubkey::new_from_array(bytes))
    }

    fn read_u64(&mut self) -> Option<u64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    fn read_string(&mut self) -> Option<String> {
        let len_bytes: [u8; 4] = self.take(4)?.try_into().ok()?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    fn finished(&self) -> bool {
        self.offset == self.data.len()
    }
}
