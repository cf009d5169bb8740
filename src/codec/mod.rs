//! Audio framing codecs
//!
//! Pure conversions between float samples, 16-bit PCM, WAV containers and
//! the base64 text used on the wire. Nothing here holds state.

mod pcm;
mod transport;
mod wav;

pub use pcm::{Pcm16Scaling, float_to_pcm16, pcm16_to_float, pcm16_to_le_bytes};
pub use transport::{DATA_URL_PREFIX, decode_base64, encode_base64};
pub use wav::{DecodedAudio, WAV_HEADER_LEN, decode_wav, encode_wav};
