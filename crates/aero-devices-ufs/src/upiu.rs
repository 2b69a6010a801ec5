//! UFS Protocol Information Unit (UPIU) codec.
//!
//! Every UPIU starts with a 12-byte header, followed by a 20-byte transaction-specific area and
//! an optional data segment whose length is declared in the header (big-endian). Multi-byte
//! fields inside a UPIU are big-endian, unlike the little-endian UTRD/PRDT structures.

pub const UPIU_HEADER_SIZE: usize = 12;
pub const UPIU_TSF_SIZE: usize = 20;
/// Offset of the data segment within a UPIU.
pub const UPIU_DATA_OFFSET: usize = UPIU_HEADER_SIZE + UPIU_TSF_SIZE;
pub const UPIU_MAX_DATA_SEGMENT: usize = 256;
pub const UPIU_MAX_LEN: usize = UPIU_DATA_OFFSET + UPIU_MAX_DATA_SEGMENT;

pub const UPIU_FLAG_UNDERFLOW: u8 = 0x20;
pub const UPIU_FLAG_OVERFLOW: u8 = 0x40;

/// Response field values of a Response UPIU.
pub const RESPONSE_SUCCESS: u8 = 0x00;
pub const RESPONSE_FAIL: u8 = 0x01;

/// Query function field values.
pub const QUERY_FUNC_STANDARD_READ: u8 = 0x01;
pub const QUERY_FUNC_STANDARD_WRITE: u8 = 0x81;

/// Maximum number of sense bytes carried in a Response UPIU.
pub const SENSE_DATA_MAX_LEN: usize = 18;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransactionType {
    NopOut,
    Command,
    DataOut,
    TaskRequest,
    QueryRequest,
    NopIn,
    Response,
    DataIn,
    TaskResponse,
    ReadyToTransfer,
    QueryResponse,
    Reject,
}

impl TransactionType {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::NopOut,
            0x01 => Self::Command,
            0x02 => Self::DataOut,
            0x04 => Self::TaskRequest,
            0x16 => Self::QueryRequest,
            0x20 => Self::NopIn,
            0x21 => Self::Response,
            0x22 => Self::DataIn,
            0x24 => Self::TaskResponse,
            0x31 => Self::ReadyToTransfer,
            0x36 => Self::QueryResponse,
            0x3f => Self::Reject,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            Self::NopOut => 0x00,
            Self::Command => 0x01,
            Self::DataOut => 0x02,
            Self::TaskRequest => 0x04,
            Self::QueryRequest => 0x16,
            Self::NopIn => 0x20,
            Self::Response => 0x21,
            Self::DataIn => 0x22,
            Self::TaskResponse => 0x24,
            Self::ReadyToTransfer => 0x31,
            Self::QueryResponse => 0x36,
            Self::Reject => 0x3f,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpiuHeader {
    pub trans_type: u8,
    pub flags: u8,
    pub lun: u8,
    pub task_tag: u8,
    pub iid_cmd_set_type: u8,
    pub query_func: u8,
    pub response: u8,
    pub scsi_status: u8,
    pub ehs_len: u8,
    pub device_info: u8,
    pub data_segment_len: u16,
}

impl UpiuHeader {
    pub fn parse(bytes: &[u8; UPIU_HEADER_SIZE]) -> Self {
        Self {
            trans_type: bytes[0],
            flags: bytes[1],
            lun: bytes[2],
            task_tag: bytes[3],
            iid_cmd_set_type: bytes[4],
            query_func: bytes[5],
            response: bytes[6],
            scsi_status: bytes[7],
            ehs_len: bytes[8],
            device_info: bytes[9],
            data_segment_len: u16::from_be_bytes([bytes[10], bytes[11]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; UPIU_HEADER_SIZE] {
        let dsl = self.data_segment_len.to_be_bytes();
        [
            self.trans_type,
            self.flags,
            self.lun,
            self.task_tag,
            self.iid_cmd_set_type,
            self.query_func,
            self.response,
            self.scsi_status,
            self.ehs_len,
            self.device_info,
            dsl[0],
            dsl[1],
        ]
    }

    pub fn transaction_type(&self) -> Option<TransactionType> {
        TransactionType::from_code(self.trans_type)
    }

    /// Response header matching `request`: same LUN, task tag, command set and query function.
    pub fn response_to(request: &UpiuHeader, trans_type: TransactionType) -> Self {
        Self {
            trans_type: trans_type.code(),
            lun: request.lun,
            task_tag: request.task_tag,
            iid_cmd_set_type: request.iid_cmd_set_type,
            query_func: request.query_func,
            ..Self::default()
        }
    }

    /// Total UPIU size implied by the declared data segment length, capped at [`UPIU_MAX_LEN`].
    pub fn bounded_len(&self) -> usize {
        (UPIU_DATA_OFFSET + usize::from(self.data_segment_len)).min(UPIU_MAX_LEN)
    }
}

/// Request UPIU exactly as fetched from guest memory.
#[derive(Clone)]
pub struct RequestUpiu {
    pub header: UpiuHeader,
    bytes: [u8; UPIU_MAX_LEN],
}

impl Default for RequestUpiu {
    fn default() -> Self {
        Self {
            header: UpiuHeader::default(),
            bytes: [0; UPIU_MAX_LEN],
        }
    }
}

impl std::fmt::Debug for RequestUpiu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestUpiu")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl RequestUpiu {
    /// Bytes beyond [`UPIU_MAX_LEN`] are ignored; missing bytes read as zero.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut buf = [0u8; UPIU_MAX_LEN];
        let len = bytes.len().min(UPIU_MAX_LEN);
        buf[..len].copy_from_slice(&bytes[..len]);
        let mut header = [0u8; UPIU_HEADER_SIZE];
        header.copy_from_slice(&buf[..UPIU_HEADER_SIZE]);
        Self {
            header: UpiuHeader::parse(&header),
            bytes: buf,
        }
    }

    pub fn command(&self) -> CommandUpiu {
        let mut cdb = [0u8; 16];
        cdb.copy_from_slice(&self.bytes[16..32]);
        CommandUpiu {
            expected_data_transfer_len: be_u32(&self.bytes[12..16]),
            cdb,
        }
    }

    pub fn query(&self) -> QueryRequestUpiu<'_> {
        let data_len = usize::from(self.header.data_segment_len).min(UPIU_MAX_DATA_SEGMENT);
        QueryRequestUpiu {
            function: self.header.query_func,
            opcode: self.bytes[12],
            idn: self.bytes[13],
            index: self.bytes[14],
            selector: self.bytes[15],
            length: u16::from_be_bytes([self.bytes[18], self.bytes[19]]),
            value: be_u32(&self.bytes[20..24]),
            data: &self.bytes[UPIU_DATA_OFFSET..UPIU_DATA_OFFSET + data_len],
        }
    }
}

/// Transaction-specific fields of a Command UPIU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandUpiu {
    pub expected_data_transfer_len: u32,
    pub cdb: [u8; 16],
}

/// Transaction-specific fields of a Query Request UPIU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRequestUpiu<'a> {
    pub function: u8,
    pub opcode: u8,
    pub idn: u8,
    pub index: u8,
    pub selector: u8,
    pub length: u16,
    pub value: u32,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScsiResponse {
    pub residual_transfer_count: u32,
    pub sense: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResponse {
    pub opcode: u8,
    pub idn: u8,
    pub index: u8,
    pub selector: u8,
    pub length: u16,
    pub value: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResponseBody {
    #[default]
    None,
    Scsi(ScsiResponse),
    Query(QueryResponse),
}

/// Response UPIU under construction for a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseUpiu {
    pub header: UpiuHeader,
    pub body: ResponseBody,
}

impl ResponseUpiu {
    pub fn nop_in(request: &UpiuHeader) -> Self {
        Self {
            header: UpiuHeader::response_to(request, TransactionType::NopIn),
            body: ResponseBody::None,
        }
    }

    /// Serializes the header, the transaction-specific area and the declared data segment.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; UPIU_MAX_LEN];
        out[..UPIU_HEADER_SIZE].copy_from_slice(&self.header.to_bytes());
        match &self.body {
            ResponseBody::None => {}
            ResponseBody::Scsi(scsi) => {
                out[12..16].copy_from_slice(&scsi.residual_transfer_count.to_be_bytes());
                let sense = &scsi.sense[..scsi.sense.len().min(SENSE_DATA_MAX_LEN)];
                if !sense.is_empty() {
                    out[32..34].copy_from_slice(&(sense.len() as u16).to_be_bytes());
                    out[34..34 + sense.len()].copy_from_slice(sense);
                }
            }
            ResponseBody::Query(query) => {
                out[12] = query.opcode;
                out[13] = query.idn;
                out[14] = query.index;
                out[15] = query.selector;
                out[18..20].copy_from_slice(&query.length.to_be_bytes());
                out[20..24].copy_from_slice(&query.value.to_be_bytes());
                let data = &query.data[..query.data.len().min(UPIU_MAX_DATA_SEGMENT)];
                out[UPIU_DATA_OFFSET..UPIU_DATA_OFFSET + data.len()].copy_from_slice(data);
            }
        }
        out.truncate(self.header.bounded_len());
        out
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_big_endian_on_the_wire() {
        let header = UpiuHeader {
            trans_type: 0x36,
            task_tag: 7,
            data_segment_len: 0x0102,
            ..Default::default()
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[0], 0x36);
        assert_eq!(bytes[3], 7);
        assert_eq!(&bytes[10..12], &[0x01, 0x02]);
        assert_eq!(UpiuHeader::parse(&bytes), header);
    }

    #[test]
    fn request_parse_decodes_query_fields() {
        let mut raw = vec![0u8; 40];
        raw[0] = 0x16;
        raw[5] = QUERY_FUNC_STANDARD_WRITE;
        raw[11] = 8;
        raw[12] = 0x04;
        raw[13] = 0x03;
        raw[14] = 0x01;
        raw[15] = 0x02;
        raw[18..20].copy_from_slice(&4u16.to_be_bytes());
        raw[20..24].copy_from_slice(&0x0000_000au32.to_be_bytes());
        raw[32..40].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let upiu = RequestUpiu::parse(&raw);
        assert_eq!(
            upiu.header.transaction_type(),
            Some(TransactionType::QueryRequest)
        );
        let q = upiu.query();
        assert_eq!(q.function, QUERY_FUNC_STANDARD_WRITE);
        assert_eq!((q.opcode, q.idn, q.index, q.selector), (4, 3, 1, 2));
        assert_eq!(q.length, 4);
        assert_eq!(q.value, 0x0a);
        assert_eq!(q.data, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn request_parse_decodes_command_fields() {
        let mut raw = vec![0u8; 32];
        raw[0] = 0x01;
        raw[12..16].copy_from_slice(&4096u32.to_be_bytes());
        raw[16] = 0x28;
        let cmd = RequestUpiu::parse(&raw).command();
        assert_eq!(cmd.expected_data_transfer_len, 4096);
        assert_eq!(cmd.cdb[0], 0x28);
    }

    #[test]
    fn oversized_request_is_capped() {
        let raw = vec![0xffu8; UPIU_MAX_LEN + 64];
        let upiu = RequestUpiu::parse(&raw);
        assert_eq!(upiu.header.bounded_len(), UPIU_MAX_LEN);
        assert_eq!(upiu.query().data.len(), UPIU_MAX_DATA_SEGMENT);
    }

    #[test]
    fn nop_in_echoes_task_tag() {
        let req = UpiuHeader {
            trans_type: 0x00,
            task_tag: 0x5a,
            lun: 0,
            ..Default::default()
        };
        let bytes = ResponseUpiu::nop_in(&req).encode();
        assert_eq!(bytes.len(), UPIU_DATA_OFFSET);
        assert_eq!(bytes[0], 0x20);
        assert_eq!(bytes[3], 0x5a);
        assert_eq!(bytes[6], RESPONSE_SUCCESS);
    }

    #[test]
    fn scsi_response_encodes_sense_segment() {
        let mut rsp = ResponseUpiu {
            header: UpiuHeader {
                trans_type: TransactionType::Response.code(),
                response: RESPONSE_FAIL,
                scsi_status: 0x02,
                data_segment_len: 20,
                ..Default::default()
            },
            body: ResponseBody::Scsi(ScsiResponse {
                residual_transfer_count: 512,
                sense: vec![0x70, 0, 0x05],
            }),
        };
        let bytes = rsp.encode();
        assert_eq!(bytes.len(), 52);
        assert_eq!(&bytes[12..16], &512u32.to_be_bytes());
        assert_eq!(&bytes[32..34], &3u16.to_be_bytes());
        assert_eq!(&bytes[34..37], &[0x70, 0, 0x05]);

        rsp.header.data_segment_len = 0;
        assert_eq!(rsp.encode().len(), UPIU_DATA_OFFSET);
    }
}
